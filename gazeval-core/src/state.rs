use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Motion {
    Stationary,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resize {
    Expanding,
    Contracting,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateBitsError {
    #[error("state bits {0:#x} set both STATIONARY and MOVING")]
    MotionConflict(u8),
    #[error("state bits {0:#x} set both EXPANDING and CONTRACTING")]
    ResizeConflict(u8),
    #[error("state bits {0:#x} contain unknown flags")]
    Unknown(u8),
}

/// Target presentation state.
///
/// Motion and resize are each a single optional value, so STATIONARY and
/// MOVING (or EXPANDING and CONTRACTING) can never be set together. The
/// numeric flag form is only produced at the edges via [`TargetState::bits`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct TargetState {
    motion: Option<Motion>,
    resize: Option<Resize>,
}

impl TargetState {
    pub const STATIONARY: u8 = 1;
    pub const MOVING: u8 = 2;
    pub const EXPANDING: u8 = 4;
    pub const CONTRACTING: u8 = 8;

    /// No flags set, the state before any message has been seen.
    pub const UNKNOWN: TargetState = TargetState {
        motion: None,
        resize: None,
    };

    pub const fn motion(&self) -> Option<Motion> {
        self.motion
    }

    pub const fn resize(&self) -> Option<Resize> {
        self.resize
    }

    pub fn is_stationary(&self) -> bool {
        self.motion == Some(Motion::Stationary)
    }

    /// Stationary with no resize in progress.
    pub fn is_settled(&self) -> bool {
        self.bits() == Self::STATIONARY
    }

    pub fn bits(&self) -> u8 {
        let m = match self.motion {
            Some(Motion::Stationary) => Self::STATIONARY,
            Some(Motion::Moving) => Self::MOVING,
            None => 0,
        };
        let r = match self.resize {
            Some(Resize::Expanding) => Self::EXPANDING,
            Some(Resize::Contracting) => Self::CONTRACTING,
            None => 0,
        };
        m | r
    }

    pub fn from_bits(bits: u8) -> Result<Self, StateBitsError> {
        if bits & !0x0f != 0 {
            return Err(StateBitsError::Unknown(bits));
        }
        let motion = match (bits & Self::STATIONARY != 0, bits & Self::MOVING != 0) {
            (true, true) => return Err(StateBitsError::MotionConflict(bits)),
            (true, false) => Some(Motion::Stationary),
            (false, true) => Some(Motion::Moving),
            (false, false) => None,
        };
        let resize = match (bits & Self::EXPANDING != 0, bits & Self::CONTRACTING != 0) {
            (true, true) => return Err(StateBitsError::ResizeConflict(bits)),
            (true, false) => Some(Resize::Expanding),
            (false, true) => Some(Resize::Contracting),
            (false, false) => None,
        };
        Ok(Self { motion, resize })
    }

    /// `START_DRAW` and `SYNCTIME`: stationary, nothing else.
    pub fn settle(self) -> Self {
        Self {
            motion: Some(Motion::Stationary),
            resize: None,
        }
    }

    /// `POS_UPDATE`.
    pub fn start_moving(self) -> Self {
        Self {
            motion: Some(Motion::Moving),
            ..self
        }
    }

    /// `TARGET_POS`.
    pub fn arrive(self) -> Self {
        Self {
            motion: Some(Motion::Stationary),
            ..self
        }
    }

    /// `EXPAND_SIZE`.
    pub fn expanding(self) -> Self {
        Self {
            resize: Some(Resize::Expanding),
            ..self
        }
    }

    /// `CONTRACT_SIZE`.
    pub fn contracting(self) -> Self {
        Self {
            resize: Some(Resize::Contracting),
            ..self
        }
    }
}

impl From<TargetState> for u8 {
    fn from(s: TargetState) -> u8 {
        s.bits()
    }
}

impl TryFrom<u8> for TargetState {
    type Error = StateBitsError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        TargetState::from_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_keep_axes_exclusive() {
        let s = TargetState::UNKNOWN.settle();
        assert_eq!(s.bits(), TargetState::STATIONARY);

        let s = s.expanding();
        assert_eq!(s.bits(), TargetState::STATIONARY | TargetState::EXPANDING);

        let s = s.contracting();
        assert_eq!(s.bits(), TargetState::STATIONARY | TargetState::CONTRACTING);

        let s = s.start_moving();
        assert_eq!(s.bits(), TargetState::MOVING | TargetState::CONTRACTING);

        let s = s.arrive().settle();
        assert!(s.is_settled());
    }

    #[test]
    fn conflicting_bits_rejected() {
        assert_eq!(
            TargetState::from_bits(3),
            Err(StateBitsError::MotionConflict(3))
        );
        assert_eq!(
            TargetState::from_bits(1 | 4 | 8),
            Err(StateBitsError::ResizeConflict(13))
        );
        assert!(TargetState::from_bits(0x10).is_err());
        assert_eq!(
            TargetState::from_bits(2 | 8).map(|s| s.bits()),
            Ok(2 | 8)
        );
    }

    #[test]
    fn serializes_as_bitmask() {
        let s = TargetState::UNKNOWN.settle().expanding();
        assert_eq!(serde_json::to_string(&s).unwrap(), "5");
        let back: TargetState = serde_json::from_str("5").unwrap();
        assert_eq!(back, s);
        assert!(serde_json::from_str::<TargetState>("3").is_err());
    }
}
