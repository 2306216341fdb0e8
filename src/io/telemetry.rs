// Telemetry and status indicator sinks
//
// Both are fire-and-forget from the control loop's point of view. The zenoh link
// hands frames to a background task over an unbounded channel, so publishing
// never blocks a cycle.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{TOPIC_INDICATOR, TOPIC_INTERLOCK, TOPIC_RT_WHEELS};
use crate::messages::{IndicatorPattern, InterlockState, WheelVelocities};

pub trait TelemetrySink: Send {
    /// Mirror the wheel references sent this cycle
    fn publish(&mut self, wheels: &WheelVelocities);

    /// Report an interlock transition
    fn publish_interlock(&mut self, _state: InterlockState) {}
}

pub trait StatusIndicator: Send {
    fn set_indicator(&mut self, label: &str, pattern: &IndicatorPattern);
}

/// Sink that only writes to the log, for offline runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn publish(&mut self, wheels: &WheelVelocities) {
        debug!(
            "Wheels: fl={:.2}, fr={:.2}, bl={:.2}, br={:.2}",
            wheels.front_left, wheels.front_right, wheels.back_left, wheels.back_right
        );
    }

    fn publish_interlock(&mut self, state: InterlockState) {
        info!("Interlock: {:?}", state);
    }
}

impl StatusIndicator for LogSink {
    fn set_indicator(&mut self, label: &str, pattern: &IndicatorPattern) {
        info!("Indicator {}: {:?}", label, pattern);
    }
}

#[derive(Debug, Clone, Serialize)]
struct IndicatorMessage {
    label: String,
    #[serde(flatten)]
    pattern: IndicatorPattern,
}

#[derive(Debug)]
enum Frame {
    Wheels(WheelVelocities),
    Interlock(InterlockState),
    Indicator(IndicatorMessage),
}

/// Zenoh publisher for telemetry and indicator requests
#[derive(Debug, Clone)]
pub struct ZenohLink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ZenohLink {
    /// Open a session, declare the publishers and start the publishing task
    pub async fn open()
    -> Result<(Self, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;

        let pub_wheels = session.declare_publisher(TOPIC_RT_WHEELS).await?;
        let pub_interlock = session.declare_publisher(TOPIC_INTERLOCK).await?;
        let pub_indicator = session.declare_publisher(TOPIC_INDICATOR).await?;
        info!(
            "Publishing to: {}, {}, {}",
            TOPIC_RT_WHEELS, TOPIC_INTERLOCK, TOPIC_INDICATOR
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let (publisher, json) = match &frame {
                    Frame::Wheels(w) => (&pub_wheels, serde_json::to_string(w)),
                    Frame::Interlock(s) => (&pub_interlock, serde_json::to_string(s)),
                    Frame::Indicator(m) => (&pub_indicator, serde_json::to_string(m)),
                };
                let json = match json {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize {:?}: {}", frame, e);
                        continue;
                    }
                };
                if let Err(e) = publisher.put(json).await {
                    warn!("Failed to publish on {}: {}", publisher.key_expr(), e);
                }
            }
            // All senders dropped: keep the session alive until here
            drop(session);
        });

        Ok((Self { tx }, task))
    }

    fn send(&self, frame: Frame) {
        // Receiver only goes away on shutdown, nothing to do then
        let _ = self.tx.send(frame);
    }
}

impl TelemetrySink for ZenohLink {
    fn publish(&mut self, wheels: &WheelVelocities) {
        self.send(Frame::Wheels(*wheels));
    }

    fn publish_interlock(&mut self, state: InterlockState) {
        self.send(Frame::Interlock(state));
    }
}

impl StatusIndicator for ZenohLink {
    fn set_indicator(&mut self, label: &str, pattern: &IndicatorPattern) {
        self.send(Frame::Indicator(IndicatorMessage {
            label: label.to_string(),
            pattern: *pattern,
        }));
    }
}
