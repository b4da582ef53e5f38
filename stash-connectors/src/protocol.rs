//! Bot wire protocol.
//!
//! Big-endian binary frames, one tag byte followed by a fixed field sequence.
//! Strings are a `u16` byte length followed by UTF-8.
//!
//! # Messages
//!
//! ```text
//! bot → exchange   0  status snapshot
//!                  4  remote storage slot (i32 slot, string item)
//! exchange → bot   1  chat control (string)
//!                  5  window click (i32 window, i32 slot, i32 button, i32 kind)
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const TAG_STATUS: u8 = 0;
pub const TAG_CHAT: u8 = 1;
pub const TAG_STORAGE_SLOT: u8 = 4;
pub const TAG_WINDOW_CLICK: u8 = 5;

/// Main inventory size, hotbar included
pub const MAIN_INVENTORY_SLOTS: usize = 36;
pub const ARMOR_SLOTS: usize = 4;
const HOTBAR_SLOTS: i32 = 9;
/// Slots of an open remote storage window that precede the player inventory
const STORAGE_WINDOW_SLOTS: i32 = 27;
const PLAYER_HOTBAR_START: i32 = 36;

/// Dimension id of the overworld
pub const OVERWORLD: i32 = 0;

// =============================================================================
// Messages
// =============================================================================

/// Full state snapshot a bot sends every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    pub bot_uuid: String,
    pub server: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    pub health: f32,
    pub saturation: f32,
    pub food_level: i32,
    pub dimension: i32,
    pub path_start_x: i32,
    pub path_start_y: i32,
    pub path_start_z: i32,
    pub has_current_segment: bool,
    pub has_next_segment: bool,
    pub calc_in_progress: bool,
    pub ticks_remaining_in_current: f64,
    pub calc_failed_last_tick: bool,
    pub safe_to_cancel: bool,
    pub current_goal: String,
    pub current_process: String,
    pub main_inventory: Vec<String>,
    pub armor: Vec<String>,
    pub off_hand: String,
    pub window_id: i32,
    /// Remote storage is open, so `window_id` refers to it
    pub storage_open: bool,
}

/// Message from a bot
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Status(Box<BotStatus>),
    /// What sits in one slot of the bot's open remote storage
    StorageSlot { slot: i32, item: String },
}

/// Window click modes understood by the game client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ClickKind {
    Pickup = 0,
    QuickMove = 1,
    Swap = 2,
    Clone = 3,
    Throw = 4,
    QuickCraft = 5,
    PickupAll = 6,
}

/// Command to a bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Chat control string, e.g. `goto ender_chest`
    Chat(String),
    WindowClick {
        window_id: i32,
        slot: i32,
        button: i32,
        kind: ClickKind,
    },
}

impl Outbound {
    /// Shift-click an item from the inventory into open remote storage
    pub fn quick_move(window_id: i32, slot: i32) -> Self {
        Self::WindowClick {
            window_id,
            slot,
            button: 0,
            kind: ClickKind::QuickMove,
        }
    }

    /// Throw the whole stack in `slot` on the ground
    pub fn throw(window_id: i32, slot: i32) -> Self {
        Self::WindowClick {
            window_id,
            slot,
            button: 1,
            kind: ClickKind::Throw,
        }
    }

    /// Walk to the nearest remote storage block and open it
    pub fn goto_storage() -> Self {
        Self::Chat("goto ender_chest".to_string())
    }
}

/// Container window slot of main-inventory index `index`.
///
/// The hotbar (indexes 0-8) sits after the rest of the inventory in window
/// numbering. With remote storage open the player inventory follows its 27
/// slots; otherwise the player window's crafting grid and armor come first.
pub fn inventory_window_slot(index: usize, storage_open: bool) -> i32 {
    let index = index as i32;
    let hotbar = index < HOTBAR_SLOTS;
    match (storage_open, hotbar) {
        (true, true) => index + 2 * STORAGE_WINDOW_SLOTS,
        (true, false) => index - HOTBAR_SLOTS + STORAGE_WINDOW_SLOTS,
        (false, true) => index + PLAYER_HOTBAR_START,
        (false, false) => index,
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Read one message.
///
/// # Errors
/// [`ProtocolError::UnknownTag`] for anything but a status or storage slot
/// message; the connection cannot be resynchronized after it.
pub async fn read_inbound<R>(reader: &mut R) -> ProtocolResult<Inbound>
where
    R: AsyncRead + Unpin,
{
    match reader.read_u8().await? {
        TAG_STATUS => Ok(Inbound::Status(Box::new(read_status(reader).await?))),
        TAG_STORAGE_SLOT => {
            let slot = reader.read_i32().await?;
            let item = read_string(reader).await?;
            Ok(Inbound::StorageSlot { slot, item })
        },
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

async fn read_status<R>(r: &mut R) -> ProtocolResult<BotStatus>
where
    R: AsyncRead + Unpin,
{
    Ok(BotStatus {
        bot_uuid: read_string(r).await?,
        server: read_string(r).await?,
        x: r.read_f64().await?,
        y: r.read_f64().await?,
        z: r.read_f64().await?,
        yaw: r.read_f32().await?,
        pitch: r.read_f32().await?,
        on_ground: read_bool(r).await?,
        health: r.read_f32().await?,
        saturation: r.read_f32().await?,
        food_level: r.read_i32().await?,
        dimension: r.read_i32().await?,
        path_start_x: r.read_i32().await?,
        path_start_y: r.read_i32().await?,
        path_start_z: r.read_i32().await?,
        has_current_segment: read_bool(r).await?,
        has_next_segment: read_bool(r).await?,
        calc_in_progress: read_bool(r).await?,
        ticks_remaining_in_current: r.read_f64().await?,
        calc_failed_last_tick: read_bool(r).await?,
        safe_to_cancel: read_bool(r).await?,
        current_goal: read_string(r).await?,
        current_process: read_string(r).await?,
        main_inventory: read_strings(r, MAIN_INVENTORY_SLOTS).await?,
        armor: read_strings(r, ARMOR_SLOTS).await?,
        off_hand: read_string(r).await?,
        window_id: r.read_i32().await?,
        storage_open: read_bool(r).await?,
    })
}

async fn read_bool<R: AsyncRead + Unpin>(r: &mut R) -> ProtocolResult<bool> {
    Ok(r.read_u8().await? != 0)
}

async fn read_string<R: AsyncRead + Unpin>(r: &mut R) -> ProtocolResult<String> {
    let len = r.read_u16().await? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).await?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

async fn read_strings<R: AsyncRead + Unpin>(r: &mut R, count: usize) -> ProtocolResult<Vec<String>> {
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        strings.push(read_string(r).await?);
    }
    Ok(strings)
}

// =============================================================================
// Encoding
// =============================================================================

/// Serialize a command into one frame
pub fn encode_outbound(message: &Outbound) -> ProtocolResult<Vec<u8>> {
    let mut frame = Vec::new();
    match message {
        Outbound::Chat(text) => {
            let len = u16::try_from(text.len()).map_err(|_| ProtocolError::StringTooLong(text.len()))?;
            frame.push(TAG_CHAT);
            frame.extend_from_slice(&len.to_be_bytes());
            frame.extend_from_slice(text.as_bytes());
        },
        Outbound::WindowClick {
            window_id,
            slot,
            button,
            kind,
        } => {
            frame.push(TAG_WINDOW_CLICK);
            for field in [*window_id, *slot, *button, *kind as i32] {
                frame.extend_from_slice(&field.to_be_bytes());
            }
        },
    }
    Ok(frame)
}

/// Write one command and flush it
pub async fn write_outbound<W>(writer: &mut W, message: &Outbound) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_outbound(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
