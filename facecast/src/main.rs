use std::process::ExitCode;

use clap::Parser;
use facecast::config::{Args, Config};
use facecast::error::AppError;
use facecast::framework::logging::init_logger;

fn main() -> ExitCode {
    init_logger();

    let result = Config::resolve(Args::parse())
        .map_err(AppError::from)
        .and_then(facecast::run);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("facecast: {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
