use std::path::Path;

use anyhow::{Context, Result};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::types::ChannelImage;

/// View and sampler for one populated texture channel.
pub struct TextureBinding {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Decodes an image file into RGBA8 pixels for a channel.
pub fn load_channel_image(path: &Path) -> Result<ChannelImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open texture at {}", path.display()))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    ChannelImage::from_rgba(width, height, rgba.into_raw())
}

pub(crate) fn create_texture_binding(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    channel: usize,
    image: &ChannelImage,
) -> TextureBinding {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("iChannel{channel} texture")),
            size: wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &image.pixels,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("iChannel{channel} sampler")),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    tracing::debug!(channel, width = image.width, height = image.height, "uploaded channel texture");

    TextureBinding {
        _texture: texture,
        view,
        sampler,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_into_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let pixels = image::RgbaImage::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        pixels.save(&path).unwrap();

        let loaded = load_channel_image(&path).unwrap();
        assert_eq!((loaded.width, loaded.height), (2, 2));
        assert_eq!(loaded.pixels.len(), 16);
        assert_eq!(&loaded.pixels[..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_channel_image(Path::new("/definitely/not/here.png")).is_err());
    }
}
