//! # UBX Configuration Frames
//!
//! u-blox receivers default to a "portable" dynamic model that drops the
//! fix above 12 km. Before flight the receiver is switched to the airborne
//! model with a `CFG-NAV5` message.
//!
//! Frame layout: sync (`0xB5 0x62`) + class + id + length (u16 LE) +
//! payload + two-byte Fletcher checksum over class..payload.

use bytes::{BufMut, BytesMut};

/// UBX frame sync characters
pub const UBX_SYNC: [u8; 2] = [0xB5, 0x62];

/// Configuration message class
pub const UBX_CLASS_CFG: u8 = 0x06;

/// Navigation engine settings message id
pub const UBX_ID_CFG_NAV5: u8 = 0x24;

/// `CFG-NAV5` payload size
pub const CFG_NAV5_PAYLOAD_SIZE: usize = 36;

/// Receiver dynamic platform models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DynamicModel {
    Portable = 0,
    Stationary = 2,
    Pedestrian = 3,
    Automotive = 4,
    Sea = 5,
    /// Airborne with < 1 g acceleration (balloon flight)
    Airborne1g = 6,
    Airborne2g = 7,
    Airborne4g = 8,
}

/// 8-bit Fletcher checksum used by UBX
pub fn ubx_checksum(data: &[u8]) -> [u8; 2] {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for &byte in data {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    [ck_a, ck_b]
}

/// Build a complete UBX frame
pub fn encode_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(payload.len() + 8);
    frame.put_slice(&UBX_SYNC);
    frame.put_u8(class);
    frame.put_u8(id);
    frame.put_u16_le(payload.len() as u16);
    frame.put_slice(payload);

    let checksum = ubx_checksum(&frame[2..]);
    frame.put_slice(&checksum);
    frame.to_vec()
}

/// `CFG-NAV5` message selecting `model`, leaving the other navigation
/// settings at the receiver defaults
pub fn cfg_nav5(model: DynamicModel) -> Vec<u8> {
    let mut payload = BytesMut::with_capacity(CFG_NAV5_PAYLOAD_SIZE);
    payload.put_u16_le(0xFFFF); // apply all settings
    payload.put_u8(model as u8);
    payload.put_u8(3); // fix mode: auto 2D/3D
    payload.put_i32_le(0); // fixed altitude (cm)
    payload.put_u32_le(10_000); // fixed altitude variance (cm^2)
    payload.put_i8(5); // minimum elevation (deg)
    payload.put_u8(0); // dead reckoning limit
    payload.put_u16_le(250); // position DOP mask (x0.1)
    payload.put_u16_le(250); // time DOP mask (x0.1)
    payload.put_u16_le(100); // position accuracy mask (m)
    payload.put_u16_le(300); // time accuracy mask (m)
    payload.resize(CFG_NAV5_PAYLOAD_SIZE, 0);

    encode_frame(UBX_CLASS_CFG, UBX_ID_CFG_NAV5, &payload)
}
