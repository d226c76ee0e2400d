//! Seam between a receive session and whatever produces its frames.

#[cfg(test)]
pub(crate) mod scripted;
pub mod synthetic;

use frame_rx_common::config::Config;
use frame_rx_common::frame::{Frame, OutputFormat, TransportFormat};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// A receive pipeline that lends out decoded frames.
///
/// The handle is shared between the session worker (get/put) and the
/// registry (wake). Producer-side resources are released when the last
/// reference is dropped.
pub trait FramePipeline: Send + Sync {
    /// Size in bytes of every frame this pipeline yields.
    fn frame_size(&self) -> usize;

    /// Block for the next frame. Returns `None` on timeout or when woken.
    fn get_frame(&self) -> Option<Frame>;

    /// Give a frame's buffer back to the producer.
    fn put_frame(&self, frame: Frame);

    /// Make a pending or the next `get_frame` return early.
    fn wake_blocked(&self);
}

pub trait PipelineFactory: Send + Sync {
    fn create(&self, ops: &RxSessionOps) -> Result<Arc<dyn FramePipeline>, PipelineError>;
}

/// One network leg of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPort {
    pub interface: String,
    pub ip: Ipv4Addr,
    pub udp_port: u16,
}

/// Everything a pipeline needs to set up one session.
#[derive(Debug, Clone)]
pub struct RxSessionOps {
    pub name: String,
    pub index: usize,
    pub primary: RxPort,
    pub redundant: Option<RxPort>,
    pub payload_type: u8,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub interlaced: bool,
    pub transport_format: TransportFormat,
    pub output_format: OutputFormat,
    pub framebuffer_count: u16,
    pub get_timeout: Duration,
    pub user_meta: bool,
}

impl RxSessionOps {
    /// Derive the parameters of session `index` from the run configuration.
    ///
    /// Sessions sharing an interface are kept apart by udp port
    /// (`udp_port + 2 * index`), or by address when `multi_inc_addr` is set
    /// (last octet + `index`, same udp port for everyone).
    pub fn for_session(config: &Config, index: usize) -> Self {
        let net = &config.network;

        let mut udp_port = net.udp_port.wrapping_add((index as u16).wrapping_mul(2));
        let mut ip = net.ip;
        if net.multi_inc_addr {
            udp_port = net.udp_port;
            let mut octets = ip.octets();
            octets[3] = octets[3].wrapping_add(index as u8);
            ip = Ipv4Addr::from(octets);
        }

        let primary = RxPort {
            interface: net.port.clone(),
            ip,
            udp_port,
        };
        let redundant = net.redundant().map(|(interface, ip)| RxPort {
            interface: interface.to_string(),
            ip,
            udp_port,
        });

        Self {
            name: format!("rx_session_{index}"),
            index,
            primary,
            redundant,
            payload_type: net.payload_type,
            width: config.video.width,
            height: config.video.height,
            fps: config.video.fps,
            interlaced: config.video.interlaced,
            transport_format: config.video.transport_format,
            output_format: config.video.output_format,
            framebuffer_count: config.pipeline.framebuffer_count,
            get_timeout: Duration::from_millis(config.pipeline.get_frame_timeout_ms),
            user_meta: config.pipeline.user_meta,
        }
    }

    pub fn num_ports(&self) -> u8 {
        if self.redundant.is_some() {
            2
        } else {
            1
        }
    }

    /// `None` when the video dimensions give a frame too large to address.
    pub fn frame_size(&self) -> Option<usize> {
        self.output_format
            .frame_size(self.width, self.height, self.interlaced)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline create failed for {name}: {reason}")]
    Create { name: String, reason: String },
}
