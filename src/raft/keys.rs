//! Key layout used by `KvStorage` inside an ordered store.
//!
//! Every key is `tag(1) ++ group(8)`, log keys add `index(8)`. Big-endian on
//! both numeric parts, so lexicographic order = numeric order and a group's
//! log is one contiguous range.

use super::types::GroupId;

const TAG_STATE: u8 = 0x01;
const TAG_MEMBERS: u8 = 0x02;
const TAG_TAIL: u8 = 0x03;
const TAG_LOG: u8 = 0x04;

fn group_key(tag: u8, group_id: GroupId) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(tag);
    key.extend_from_slice(&group_id.to_be_bytes());
    key
}

/// `state(1) ++ group(8)`: election state
pub fn state_key(group_id: GroupId) -> Vec<u8> {
    group_key(TAG_STATE, group_id)
}

/// `members(1) ++ group(8)`: membership record
pub fn members_key(group_id: GroupId) -> Vec<u8> {
    group_key(TAG_MEMBERS, group_id)
}

/// `tail(1) ++ group(8)`: last index and term of the log
pub fn tail_key(group_id: GroupId) -> Vec<u8> {
    group_key(TAG_TAIL, group_id)
}

/// `log(1) ++ group(8) ++ index(8)`
pub fn log_key(group_id: GroupId, index: u64) -> Vec<u8> {
    let mut key = group_key(TAG_LOG, group_id);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Exclusive upper bound for a group's log keys.
///
/// `log_key(group, u64::MAX)` itself is never written, since it would need
/// 2^64 - 1 contiguous appends.
pub fn log_end(group_id: GroupId) -> Vec<u8> {
    log_key(group_id, u64::MAX)
}

/// Half-open range `[start, end)` covering every key with the given kind
pub fn kind_range(kind: RecordKind) -> (Vec<u8>, Vec<u8>) {
    let tag = kind.tag();
    (vec![tag], vec![tag + 1])
}

/// Per-group record kinds that identify a group during load
#[derive(Debug, Clone, Copy)]
pub enum RecordKind {
    State,
    Members,
    Tail,
}

impl RecordKind {
    fn tag(self) -> u8 {
        match self {
            RecordKind::State => TAG_STATE,
            RecordKind::Members => TAG_MEMBERS,
            RecordKind::Tail => TAG_TAIL,
        }
    }
}

/// Recover the group id from a `tag ++ group` key
pub fn parse_group(key: &[u8]) -> Option<GroupId> {
    let bytes: [u8; 8] = key.get(1..9)?.try_into().ok()?;
    Some(GroupId::from_be_bytes(bytes))
}
