mod support;

use facecast::render::gpu::{SPRITE_SHADER, validate_shader};

#[test]
fn sprite_shader_is_valid_wgsl() {
    validate_shader(SPRITE_SHADER).expect("sprite shader");
}

#[test]
fn gpu_smoke_test_is_opt_in() {
    if !support::gpu_tests_enabled() {
        eprintln!(
            "Skipping GPU smoke test. Set FACECAST_RUN_GPU_TESTS=1 to run."
        );
        return;
    }

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(
        &wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: true,
            compatible_surface: None,
        },
    ))
    .expect("expected a headless adapter for GPU smoke test");

    let info = adapter.get_info();
    assert!(!info.name.is_empty());
}
