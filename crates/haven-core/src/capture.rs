use crate::{AudioRef, GeoPoint};
use thiserror::Error;

/// Contracts for the device-facing capture collaborators. The lifecycle
/// core only consumes the handles they emit; device access, encoding and
/// permissions live entirely behind these traits.

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureFailure {
    #[error("audio capture unavailable: {0}")]
    Audio(String),
    #[error("unable to fetch location")]
    Location,
}

/// Recording device wrapper. `stop` resolves with the audio reference once
/// the device has flushed the recording.
pub trait AudioCapture {
    fn start(&mut self) -> Result<(), CaptureFailure>;
    fn stop(&mut self) -> Result<AudioRef, CaptureFailure>;
}

/// Single-shot position snapshot; a failure is surfaced to the caller and
/// never retried here.
pub trait LocationCapture {
    fn capture(&mut self) -> Result<GeoPoint, CaptureFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedRecorder {
        recording: bool,
    }

    impl AudioCapture for ScriptedRecorder {
        fn start(&mut self) -> Result<(), CaptureFailure> {
            self.recording = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<AudioRef, CaptureFailure> {
            if !self.recording {
                return Err(CaptureFailure::Audio("not recording".to_string()));
            }
            self.recording = false;
            Ok(AudioRef("blob:rec-1".to_string()))
        }
    }

    #[test]
    fn recorder_contract_emits_reference_on_stop() {
        let mut recorder = ScriptedRecorder { recording: false };
        assert!(recorder.stop().is_err());

        recorder.start().expect("start");
        let reference = recorder.stop().expect("stop");
        assert_eq!(reference.as_str(), "blob:rec-1");
    }

    #[test]
    fn location_failure_message_is_user_facing() {
        assert_eq!(
            CaptureFailure::Location.to_string(),
            "unable to fetch location"
        );
    }
}
