use super::backend::{
    AccessUnitKind, EncodedAccessUnit, EncoderBackend, EncoderCallback, EncoderFactory,
    EncoderFormat, START_CODE,
};
use crate::error::EncoderError;
use bytes::Bytes;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::{AppSink, AppSrc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SPS_NAL_TYPE: u8 = 7;

/// Software H.264 encoder on an `appsrc ! x264enc ! appsink` pipeline.
///
/// Pull mode only. Input never waits for a buffer, so the queue timeout is
/// not used; output is Annex-B byte-stream with parameter sets in front of
/// every IDR picture.
pub struct GstEncoderBackend {
    pipeline: Option<Pipeline>,
    appsrc: Option<AppSrc>,
    appsink: Option<AppSink>,
}

impl GstEncoderBackend {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            appsrc: None,
            appsink: None,
        }
    }

    fn pipeline_description(format: &EncoderFormat) -> String {
        let key_int = (format.frame_rate * format.i_frame_interval_secs).max(1);
        let tune = if format.low_latency {
            "tune=zerolatency "
        } else {
            ""
        };

        format!(
            "appsrc name=src format=time is-live=true do-timestamp=false \
             caps=video/x-raw,format=NV21,width={},height={},framerate={}/1 ! \
             videoconvert ! video/x-raw,format=I420 ! \
             x264enc {}speed-preset=ultrafast bitrate={} key-int-max={} ! \
             video/x-h264,stream-format=byte-stream,alignment=au ! \
             appsink name=sink sync=false max-buffers=32 drop=false emit-signals=false",
            format.width,
            format.height,
            format.frame_rate,
            tune,
            (format.bitrate / 1000).max(1),
            key_int
        )
    }

    fn classify(data: &[u8], delta: bool) -> AccessUnitKind {
        let leading_nal = data
            .strip_prefix(&START_CODE[..])
            .or_else(|| data.strip_prefix(&START_CODE[1..]))
            .and_then(|rest| rest.first())
            .map(|header| header & 0x1f);

        if leading_nal == Some(SPS_NAL_TYPE) {
            AccessUnitKind::Config
        } else {
            AccessUnitKind::Picture { keyframe: !delta }
        }
    }
}

impl Default for GstEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBackend for GstEncoderBackend {
    fn name(&self) -> &str {
        "x264"
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), EncoderError> {
        let description = Self::pipeline_description(format);
        debug!("Encoder pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| EncoderError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| EncoderError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.downcast::<AppSrc>().ok())
            .ok_or_else(|| EncoderError::Configuration {
                details: "Failed to get appsrc element".to_string(),
            })?;
        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| EncoderError::Configuration {
                details: "Failed to get appsink element".to_string(),
            })?;

        self.pipeline = Some(pipeline);
        self.appsrc = Some(appsrc);
        self.appsink = Some(appsink);
        Ok(())
    }

    fn set_callback(
        &mut self,
        callback: Option<Arc<dyn EncoderCallback>>,
    ) -> Result<(), EncoderError> {
        match callback {
            Some(_) => Err(EncoderError::Unsupported {
                operation: "push-mode callbacks",
            }),
            None => Ok(()),
        }
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        let pipeline = self.pipeline.as_ref().ok_or(EncoderError::InvalidState {
            expected: "configured",
            actual: "unconfigured",
        })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| EncoderError::Codec {
                details: format!("Failed to start pipeline: {}", e),
                fatal: true,
            })?;

        info!("GStreamer x264 encoder pipeline started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        if let Some(appsrc) = self.appsrc.take() {
            let _ = appsrc.end_of_stream();
        }
        self.appsink = None;

        if let Some(pipeline) = self.pipeline.take() {
            pipeline
                .set_state(gstreamer::State::Null)
                .map_err(|e| EncoderError::Codec {
                    details: format!("Failed to stop pipeline: {}", e),
                    fatal: false,
                })?;
        }
        Ok(())
    }

    fn queue_input(
        &mut self,
        data: &[u8],
        pts_us: u64,
        _timeout: Duration,
    ) -> Result<bool, EncoderError> {
        let appsrc = self.appsrc.as_ref().ok_or(EncoderError::InvalidState {
            expected: "running",
            actual: "stopped",
        })?;

        let mut buffer = gstreamer::Buffer::from_slice(data.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gstreamer::ClockTime::from_useconds(pts_us));
        }

        match appsrc.push_buffer(buffer) {
            Ok(_) => Ok(true),
            Err(gstreamer::FlowError::Flushing) => Ok(false),
            Err(e) => Err(EncoderError::Codec {
                details: format!("Failed to push buffer: {:?}", e),
                fatal: true,
            }),
        }
    }

    fn dequeue_output(&mut self) -> Result<Option<EncodedAccessUnit>, EncoderError> {
        let Some(appsink) = self.appsink.as_ref() else {
            return Ok(None);
        };

        let Some(sample) = appsink.try_pull_sample(gstreamer::ClockTime::ZERO) else {
            if appsink.is_eos() {
                return Ok(Some(EncodedAccessUnit::end_of_stream(0)));
            }
            return Ok(None);
        };

        let Some(buffer) = sample.buffer() else {
            warn!("Encoder sample without buffer");
            return Ok(None);
        };

        let map = buffer.map_readable().map_err(|e| EncoderError::Codec {
            details: format!("Failed to map buffer: {}", e),
            fatal: false,
        })?;

        let delta = buffer.flags().contains(gstreamer::BufferFlags::DELTA_UNIT);
        let pts_us = buffer.pts().map(|pts| pts.useconds()).unwrap_or(0);
        let kind = Self::classify(map.as_slice(), delta);

        Ok(Some(EncodedAccessUnit {
            kind,
            data: Bytes::copy_from_slice(map.as_slice()),
            pts_us,
        }))
    }
}

impl Drop for GstEncoderBackend {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Provides the x264 backend when GStreamer and the encoder plugin exist
pub struct GstEncoderFactory;

impl EncoderFactory for GstEncoderFactory {
    fn create(&self, format: &EncoderFormat) -> Option<Box<dyn EncoderBackend>> {
        if format.mime != "video/avc" {
            warn!("GStreamer backend only encodes video/avc, not {}", format.mime);
            return None;
        }

        if let Err(e) = gstreamer::init() {
            warn!("Failed to initialize GStreamer: {}", e);
            return None;
        }

        if gstreamer::ElementFactory::find("x264enc").is_none() {
            warn!("GStreamer x264enc plugin not installed");
            return None;
        }

        Some(Box::new(GstEncoderBackend::new()))
    }
}
