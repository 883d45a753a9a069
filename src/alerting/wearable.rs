//! Gestures triggered from a paired wearable.
//!
//! The wearable notifies a short value on its characteristic:
//!
//! | byte | meaning                      |
//! |------|------------------------------|
//! | 0    | marker, `0x01` = SOS trigger |
//! | 1    | tap count, 1-255             |
//! | 2    | battery percent (optional)   |
//!
//! Decoded gestures enter the same channel as on-screen bursts but are
//! marked `from_device`, so no confirmation is ever asked for them.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Gesture;

const TRIGGER_MARKER: u8 = 0x01;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WearableError {
    #[error("characteristic value has {0} bytes, expected 2 or 3")]
    BadLength(usize),

    #[error("unknown marker byte {0:#04x}")]
    UnknownMarker(u8),

    #[error("trigger with zero taps")]
    ZeroTaps,

    #[error("battery level {0} out of range")]
    BadBattery(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WearableSignal {
    pub taps: u8,
    pub battery_percent: Option<u8>,
}

impl WearableSignal {
    pub fn decode(value: &[u8]) -> Result<Self, WearableError> {
        let (marker, taps, battery) = match value {
            [marker, taps] => (*marker, *taps, None),
            [marker, taps, battery] => (*marker, *taps, Some(*battery)),
            other => return Err(WearableError::BadLength(other.len())),
        };
        if marker != TRIGGER_MARKER {
            return Err(WearableError::UnknownMarker(marker));
        }
        if taps == 0 {
            return Err(WearableError::ZeroTaps);
        }
        if let Some(level) = battery {
            if level > 100 {
                return Err(WearableError::BadBattery(level));
            }
        }
        Ok(Self {
            taps,
            battery_percent: battery,
        })
    }

    pub fn gesture(&self) -> Gesture {
        Gesture {
            taps: u32::from(self.taps),
            from_device: true,
        }
    }
}

/// Forwards characteristic notifications into the gesture channel.
pub struct WearableListener {
    task: JoinHandle<()>,
}

impl WearableListener {
    /// `notifications` carries raw characteristic values from the shell.
    pub fn start(
        mut notifications: mpsc::Receiver<Vec<u8>>,
        gestures: mpsc::UnboundedSender<Gesture>,
    ) -> Self {
        let task = tokio::spawn(async move {
            while let Some(value) = notifications.recv().await {
                match WearableSignal::decode(&value) {
                    Ok(signal) => {
                        info!(
                            taps = signal.taps,
                            battery = ?signal.battery_percent,
                            "Wearable trigger"
                        );
                        if gestures.send(signal.gesture()).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring wearable notification"),
                }
            }
            debug!("Wearable notifications ended");
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for WearableListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trigger() {
        assert_eq!(
            WearableSignal::decode(&[0x01, 3, 80]),
            Ok(WearableSignal {
                taps: 3,
                battery_percent: Some(80)
            })
        );
        assert_eq!(
            WearableSignal::decode(&[0x01, 1]).unwrap().gesture(),
            Gesture {
                taps: 1,
                from_device: true
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_values() {
        assert_eq!(WearableSignal::decode(&[]), Err(WearableError::BadLength(0)));
        assert_eq!(WearableSignal::decode(&[1, 2, 3, 4]), Err(WearableError::BadLength(4)));
        assert_eq!(WearableSignal::decode(&[0x02, 1]), Err(WearableError::UnknownMarker(0x02)));
        assert_eq!(WearableSignal::decode(&[0x01, 0]), Err(WearableError::ZeroTaps));
        assert_eq!(WearableSignal::decode(&[0x01, 1, 101]), Err(WearableError::BadBattery(101)));
    }

    #[tokio::test]
    async fn test_listener_skips_garbage() {
        let (notify_tx, notify_rx) = mpsc::channel(4);
        let (gesture_tx, mut gesture_rx) = mpsc::unbounded_channel();
        let _listener = WearableListener::start(notify_rx, gesture_tx);

        notify_tx.send(vec![0xff]).await.unwrap();
        notify_tx.send(vec![0x01, 4, 55]).await.unwrap();

        let gesture = gesture_rx.recv().await.unwrap();
        assert_eq!(gesture.taps, 4);
        assert!(gesture.from_device);
    }
}
