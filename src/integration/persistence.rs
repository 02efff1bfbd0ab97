//! Persistence codec
//!
//! States are written as a versioned [`FlattenRecord`]. Decoding validates
//! every field against the snapshot invariants and refuses anything that
//! would produce a partially valid state; callers fall back to NORMAL.

use serde::{Deserialize, Serialize};

use crate::core::error::DecodeError;
use crate::core::types::ObjectId;
use crate::flatten::state::{FlattenPhase, FlattenState, FrozenPose};
use crate::flatten::timer::FALLBACK_DISABLED;

/// Current record layout version
pub const RECORD_VERSION: u32 = 1;

/// Converts states to and from a storable record
pub trait PersistenceCodec {
    type Record;

    fn serialize(&self, state: &FlattenState) -> Self::Record;

    fn deserialize(&self, record: &Self::Record) -> Result<FlattenState, DecodeError>;
}

/// On-disk shape of a flatten state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenRecord {
    pub version: u32,
    pub phase: FlattenPhase,
    pub height_scale: f64,
    pub width_scale: f64,
    pub depth_scale: f64,
    pub spread_multiplier: f64,
    pub original_height: f64,
    pub frozen_pose: FrozenPose,
    pub recovery_ticks_remaining: i32,
    pub fallback_ticks_remaining: i32,
    pub reflatten_cooldown_ticks: i32,
    pub tracked_object_count: u32,
    pub has_contact: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_object_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_position: Option<[f64; 3]>,
}

/// Codec for [`FlattenRecord`] values, with JSON text helpers
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl RecordCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn to_json(&self, state: &FlattenState) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(&self.serialize(state))?)
    }

    pub fn from_json(&self, json: &str) -> Result<FlattenState, DecodeError> {
        let record: FlattenRecord = serde_json::from_str(json)?;
        self.deserialize(&record)
    }
}

impl PersistenceCodec for RecordCodec {
    type Record = FlattenRecord;

    fn serialize(&self, state: &FlattenState) -> FlattenRecord {
        FlattenRecord {
            version: RECORD_VERSION,
            phase: state.phase,
            height_scale: state.height_scale,
            width_scale: state.width_scale,
            depth_scale: state.depth_scale,
            spread_multiplier: state.spread_multiplier,
            original_height: state.original_height,
            frozen_pose: state.frozen_pose,
            recovery_ticks_remaining: state.recovery_ticks_remaining,
            fallback_ticks_remaining: state.fallback_ticks_remaining,
            reflatten_cooldown_ticks: state.reflatten_cooldown_ticks,
            tracked_object_count: state.tracked_object_count,
            has_contact: state.has_contact,
            contact_object_id: state.contact_object_id.map(|id| id.0),
            contact_position: state.contact_position.map(|p| p.to_array()),
        }
    }

    fn deserialize(&self, record: &FlattenRecord) -> Result<FlattenState, DecodeError> {
        if record.version != RECORD_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found: record.version,
                expected: RECORD_VERSION,
            });
        }
        validate(record)?;

        Ok(FlattenState {
            phase: record.phase,
            height_scale: record.height_scale,
            width_scale: record.width_scale,
            depth_scale: record.depth_scale,
            spread_multiplier: record.spread_multiplier,
            original_height: record.original_height,
            frozen_pose: record.frozen_pose,
            recovery_ticks_remaining: record.recovery_ticks_remaining,
            fallback_ticks_remaining: record.fallback_ticks_remaining,
            reflatten_cooldown_ticks: record.reflatten_cooldown_ticks,
            tracked_object_count: record.tracked_object_count,
            has_contact: record.has_contact,
            contact_object_id: record.contact_object_id.map(ObjectId),
            contact_position: record.contact_position.map(glam::DVec3::from_array),
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn validate(record: &FlattenRecord) -> Result<(), DecodeError> {
    let floats = [
        ("height_scale", record.height_scale),
        ("width_scale", record.width_scale),
        ("depth_scale", record.depth_scale),
        ("spread_multiplier", record.spread_multiplier),
        ("original_height", record.original_height),
    ];
    for (field, value) in floats {
        if !value.is_finite() {
            return Err(invalid(field, "not a finite number"));
        }
    }

    if !(record.height_scale > 0.0 && record.height_scale <= 1.0) {
        return Err(invalid("height_scale", format!("{} outside (0, 1]", record.height_scale)));
    }
    if record.width_scale < 1.0 {
        return Err(invalid("width_scale", format!("{} below 1.0", record.width_scale)));
    }
    if record.depth_scale < 1.0 {
        return Err(invalid("depth_scale", format!("{} below 1.0", record.depth_scale)));
    }
    if record.spread_multiplier < 0.0 {
        return Err(invalid("spread_multiplier", "negative"));
    }
    if record.original_height < 0.0 {
        return Err(invalid("original_height", "negative"));
    }
    if record.recovery_ticks_remaining < 0 {
        return Err(invalid("recovery_ticks_remaining", "negative"));
    }
    if record.reflatten_cooldown_ticks < 0 {
        return Err(invalid("reflatten_cooldown_ticks", "negative"));
    }
    if record.fallback_ticks_remaining < FALLBACK_DISABLED {
        return Err(invalid("fallback_ticks_remaining", "below the disabled sentinel"));
    }
    if !record.has_contact
        && (record.contact_object_id.is_some() || record.contact_position.is_some())
    {
        return Err(invalid("has_contact", "contact details present without a contact"));
    }
    if let Some(position) = record.contact_position {
        if position.iter().any(|v| !v.is_finite()) {
            return Err(invalid("contact_position", "not a finite position"));
        }
    }

    if record.phase == FlattenPhase::Normal {
        let reset = record.height_scale == 1.0
            && record.width_scale == 1.0
            && record.depth_scale == 1.0
            && record.spread_multiplier == 0.0
            && record.recovery_ticks_remaining == 0
            && record.fallback_ticks_remaining == 0
            && record.reflatten_cooldown_ticks == 0
            && record.tracked_object_count == 0
            && !record.has_contact;
        if !reset {
            return Err(invalid("phase", "normal state carries compression data"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use proptest::prelude::*;

    fn compressed() -> FlattenState {
        FlattenState {
            phase: FlattenPhase::Compressed,
            height_scale: 0.05,
            width_scale: 1.475,
            depth_scale: 1.475,
            spread_multiplier: 2.4,
            original_height: 1.8,
            frozen_pose: FrozenPose::Crouching,
            fallback_ticks_remaining: 137,
            reflatten_cooldown_ticks: 3,
            tracked_object_count: 3,
            has_contact: true,
            contact_object_id: Some(ObjectId(42)),
            contact_position: Some(DVec3::new(0.5, 64.0, -3.5)),
            ..FlattenState::normal()
        }
    }

    #[test]
    fn test_json_round_trip() {
        let codec = RecordCodec::new();
        let json = codec.to_json(&compressed()).unwrap();
        assert_eq!(codec.from_json(&json).unwrap(), compressed());
    }

    #[test]
    fn test_normal_record_omits_contact_fields() {
        let json = RecordCodec::new().to_json(&FlattenState::normal()).unwrap();
        assert!(!json.contains("contact_object_id"));
        assert!(!json.contains("contact_position"));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let codec = RecordCodec::new();
        let mut record = codec.serialize(&compressed());
        record.version = 99;
        assert!(matches!(
            codec.deserialize(&record),
            Err(DecodeError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_out_of_range_scale_rejected() {
        let codec = RecordCodec::new();
        let mut record = codec.serialize(&compressed());
        record.height_scale = 1.5;
        assert!(matches!(
            codec.deserialize(&record),
            Err(DecodeError::InvalidField { field: "height_scale", .. })
        ));
    }

    #[test]
    fn test_dirty_normal_rejected() {
        let codec = RecordCodec::new();
        let mut record = codec.serialize(&FlattenState::normal());
        record.reflatten_cooldown_ticks = 4;
        assert!(codec.deserialize(&record).is_err());
    }

    #[test]
    fn test_contact_details_without_contact_rejected() {
        let codec = RecordCodec::new();
        let mut record = codec.serialize(&compressed());
        record.has_contact = false;
        assert!(codec.deserialize(&record).is_err());
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let err = RecordCodec::new().from_json("{\"version\": 1, \"phase\": \"Squished\"}").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    fn arb_state() -> impl Strategy<Value = FlattenState> {
        let phase = prop_oneof![
            Just(FlattenPhase::Compressing),
            Just(FlattenPhase::Compressed),
            Just(FlattenPhase::Recovering),
        ];
        let pose = prop_oneof![
            Just(FrozenPose::Standing),
            Just(FrozenPose::Crouching),
            Just(FrozenPose::Swimming),
            Just(FrozenPose::Sleeping),
        ];
        let contact = prop::option::of((
            prop::option::of(any::<u64>()),
            prop::option::of((-1.0e6f64..1.0e6, -64.0f64..320.0, -1.0e6f64..1.0e6)),
        ));
        let deformed = (
            phase,
            0.001f64..=1.0,
            0.0f64..6.0,
            0.0f64..4.0,
            pose,
            (0i32..200, -1i32..600, 0i32..40),
            0u32..16,
            contact,
        )
            .prop_map(
                |(phase, height, spread, original, pose, timers, count, contact)| {
                    let width = 1.0 + (1.0 - height) / 2.0;
                    let (has_contact, object_id, position) = match contact {
                        Some((id, position)) => (
                            true,
                            id.map(ObjectId),
                            position.map(|(x, y, z)| DVec3::new(x, y, z)),
                        ),
                        None => (false, None, None),
                    };
                    FlattenState {
                        phase,
                        height_scale: height,
                        width_scale: width,
                        depth_scale: width,
                        spread_multiplier: spread,
                        original_height: original,
                        frozen_pose: pose,
                        recovery_ticks_remaining: timers.0,
                        fallback_ticks_remaining: timers.1,
                        reflatten_cooldown_ticks: timers.2,
                        tracked_object_count: count,
                        has_contact,
                        contact_object_id: object_id,
                        contact_position: position,
                    }
                },
            );
        prop_oneof![1 => Just(FlattenState::normal()), 4 => deformed]
    }

    proptest! {
        #[test]
        fn prop_record_round_trip(state in arb_state()) {
            let codec = RecordCodec::new();
            let restored = codec.deserialize(&codec.serialize(&state)).unwrap();
            prop_assert_eq!(restored, state);
        }

        #[test]
        fn prop_json_round_trip(state in arb_state()) {
            let codec = RecordCodec::new();
            let json = codec.to_json(&state).unwrap();
            prop_assert_eq!(codec.from_json(&json).unwrap(), state);
        }
    }
}
