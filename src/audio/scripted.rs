// Scripted capture source
//
// Replays a fixed list of buffers from a background task. Useful for demos
// and for driving the recording controller with a known sequence.

use anyhow::{bail, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::backend::{CaptureFormat, CaptureSource, SampleBuffer};

pub struct ScriptedCaptureSource {
    format: CaptureFormat,
    script: Vec<SampleBuffer>,
    /// Keep the stream open after the script until `stop` is called
    hold_open: bool,
    stop_tx: Option<watch::Sender<bool>>,
}

impl ScriptedCaptureSource {
    pub fn new(format: CaptureFormat, script: Vec<SampleBuffer>) -> Self {
        Self {
            format,
            script,
            hold_open: false,
            stop_tx: None,
        }
    }

    pub fn hold_open(mut self, hold_open: bool) -> Self {
        self.hold_open = hold_open;
        self
    }
}

#[async_trait::async_trait]
impl CaptureSource for ScriptedCaptureSource {
    async fn start(&mut self) -> Result<(CaptureFormat, mpsc::Receiver<SampleBuffer>)> {
        if self.stop_tx.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(self.script.len().max(1));
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let script = std::mem::take(&mut self.script);
        let hold_open = self.hold_open;

        tokio::spawn(async move {
            for buffer in script {
                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    // Nothing is sent once stop is visible
                    biased;

                    _ = stop_rx.changed() => break,
                    sent = tx.send(buffer) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }

            if hold_open {
                let _ = stop_rx.wait_for(|stopped| *stopped).await;
            }
            debug!("Scripted capture finished");
        });

        self.stop_tx = Some(stop_tx);
        info!(
            "Scripted capture started ({}Hz, {} channels)",
            self.format.sample_rate, self.format.channels
        );

        Ok((self.format, rx))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            info!("Stopping scripted capture");
            let _ = stop_tx.send(true);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(len: usize) -> Vec<SampleBuffer> {
        let format = CaptureFormat::float32(16000, 1);
        (0..len)
            .map(|i| SampleBuffer::new(vec![0.5; 16], format, i as u64 * 10))
            .collect()
    }

    #[tokio::test]
    async fn stop_before_delivery_sends_nothing() {
        let mut source = ScriptedCaptureSource::new(CaptureFormat::float32(16000, 1), script(3));
        let (_, mut rx) = source.start().await.unwrap();
        source.stop().await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(!source.is_capturing());
    }

    #[tokio::test]
    async fn held_stream_ends_on_stop() {
        let mut source =
            ScriptedCaptureSource::new(CaptureFormat::float32(16000, 1), script(2)).hold_open(true);
        let (_, mut rx) = source.start().await.unwrap();

        assert_eq!(rx.recv().await.map(|b| b.timestamp_ms), Some(0));
        assert_eq!(rx.recv().await.map(|b| b.timestamp_ms), Some(10));
        source.stop().await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
