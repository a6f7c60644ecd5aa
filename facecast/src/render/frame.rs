use std::sync::Arc;

/// One presentable frame: the acquired surface texture plus the encoder
/// every sprite pass records into. Consumed by `submit`.
pub struct Frame {
    pub surface_view: wgpu::TextureView,
    size: [u32; 2],
    encoder: wgpu::CommandEncoder,
    output: wgpu::SurfaceTexture,
    queue: Arc<wgpu::Queue>,
}

impl Frame {
    pub fn new(
        device: &wgpu::Device,
        queue: Arc<wgpu::Queue>,
        output: wgpu::SurfaceTexture,
    ) -> Self {
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let size = [output.texture.width(), output.texture.height()];

        let encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("facecast-frame-encoder"),
            });

        Self {
            surface_view,
            size,
            encoder,
            output,
            queue,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    pub fn clear(&mut self, color: wgpu::Color) {
        let _pass =
            self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("facecast-clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.surface_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
    }

    pub fn submit(self) {
        self.queue.submit(Some(self.encoder.finish()));
        self.output.present();
    }
}
