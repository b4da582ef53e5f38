//! Deposit item naming convention
//!
//! A deposited container is renamed to `DEPOSIT_NAME_PREFIX` followed by the
//! deposit id as 8 lowercase hex digits. Bots report items as
//! `<display name>$<serialized item data>`; the data of a container starts
//! with its tile id and, after a short header, lists its contents. Those
//! contents are the listing's `item_key`.

use crate::value_objects::{DepositId, REMOTE_STORAGE_SLOTS};

/// Prefix every deposit item name carries
pub const DEPOSIT_NAME_PREFIX: &str = "stash#";

/// Placeholder bots report for an empty inventory slot
pub const EMPTY_ITEM: &str = "empty";

const CONTAINER_TILE: &str = "tile.shulkerBox";
const MIN_ITEM_DATA_LEN: usize = 40;
/// Bytes between the first `;` of the item data and its contents
const CONTENTS_HEADER_LEN: usize = 6;

/// Name a bot must see on the item for this deposit
pub fn deposit_item_name(id: DepositId) -> String {
    format!("{}{}", DEPOSIT_NAME_PREFIX, id)
}

/// Extract the deposit id from an item display name.
///
/// Returns `None` unless the name is exactly the prefix plus 8 hex digits
/// encoding a non-zero id.
pub fn parse_deposit_name(name: &str) -> Option<DepositId> {
    let digits = name.strip_prefix(DEPOSIT_NAME_PREFIX)?;
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let id = DepositId::new(u32::from_str_radix(digits, 16).ok()?).ok()?;
    // uppercase digits parse but are not what we issued
    (deposit_item_name(id) == name).then_some(id)
}

/// A deposit container as reported by a bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedItem {
    pub deposit_id: DepositId,
    /// Serialized container contents, comparable to `Listing::item_key`
    pub contents: String,
}

impl ObservedItem {
    /// Parse a raw item string reported by a bot.
    ///
    /// Anything that is not a correctly named, plausibly sized container
    /// yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == EMPTY_ITEM {
            return None;
        }
        let (name, data) = raw.split_once('$')?;
        let deposit_id = parse_deposit_name(name)?;
        if data.len() < MIN_ITEM_DATA_LEN || !data.starts_with(CONTAINER_TILE) {
            return None;
        }
        let header = data.find(';')?;
        let contents = data.get(header + CONTENTS_HEADER_LEN..)?;
        Some(Self {
            deposit_id,
            contents: contents.to_string(),
        })
    }
}

/// Contents key of a container completely filled with 64-stacks of `item`.
///
/// `item` is the item id with its damage value, e.g. `item.totem;0`.
pub fn full_container_key(item: &str) -> String {
    (0..REMOTE_STORAGE_SLOTS)
        .map(|_| format!("{};64;", item))
        .collect::<Vec<_>>()
        .join(",")
}
