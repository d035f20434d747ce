//! Frame to model-input tensor conversion.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};

use crate::detect::{ChannelOrder, InputSpec};
use crate::frame::Frame;

/// Resize a frame to the model input, reorder channels, scale to [0, 1] and
/// lay the result out channel-first.
pub fn to_tensor(frame: &Frame, input: &InputSpec) -> Vec<f32> {
    let width = input.width as usize;
    let height = input.height as usize;
    let plane = width * height;
    let mut tensor = vec![0.0f32; 3 * plane];

    let resized;
    let pixels: &[u8] = if frame.width == input.width && frame.height == input.height {
        frame.pixels()
    } else {
        let view: ImageBuffer<Rgb<u8>, &[u8]> =
            match ImageBuffer::from_raw(frame.width, frame.height, frame.pixels()) {
                Some(view) => view,
                None => return tensor,
            };
        resized = imageops::resize(&view, input.width, input.height, FilterType::Triangle);
        resized.as_raw()
    };

    let channel_map: [usize; 3] = match input.channel_order {
        ChannelOrder::Rgb => [0, 1, 2],
        ChannelOrder::Bgr => [2, 1, 0],
    };

    for (i, px) in pixels.chunks_exact(3).enumerate() {
        for (out_channel, &src_channel) in channel_map.iter().enumerate() {
            tensor[out_channel * plane + i] = px[src_channel] as f32 / 255.0;
        }
    }
    tensor
}
