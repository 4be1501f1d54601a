//! Occupancy payload encoding.
//!
//! The downstream dashboard schema only accepts 4-bit integer fields, so spot
//! occupancy is packed by fixed 1-based position into four nibbles. Bit 3 is
//! the first member of a group and bit 0 the last. Reordering spots changes
//! the meaning of every field; keep all packing in `pack_group`.

use serde::Serialize;

use crate::registry::Spot;

/// Spot positions for each group, most significant bit first.
/// `None` marks a reserved bit that is always zero.
const GROUP_1_2_8_9: [Option<usize>; 4] = [Some(1), Some(2), Some(8), Some(9)];
const GROUP_3_4_10_11: [Option<usize>; 4] = [Some(3), Some(4), Some(10), Some(11)];
const GROUP_5_6_12_13: [Option<usize>; 4] = [Some(5), Some(6), Some(12), Some(13)];
const GROUP_7_14: [Option<usize>; 4] = [Some(7), None, Some(14), None];

/// Telemetry record sent to the dashboard bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Payload {
    #[serde(rename = "psStatus1_2_8_9")]
    pub group_a: u32,
    #[serde(rename = "psStatus3_4_10_11")]
    pub group_b: u32,
    #[serde(rename = "psStatus5_6_12_13")]
    pub group_c: u32,
    #[serde(rename = "psStatus7_14")]
    pub group_d: u32,
    pub taken: usize,
    pub empty: usize,
    /// Latitude/longitude; the schema requires the field but the site is fixed.
    pub location: [i32; 2],
}

/// Serialized form written to the datagram socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// Compact JSON object with the dashboard field names.
    #[default]
    Json,
    /// Legacy `"<taken>,<empty>\n"` line.
    Counts,
}

impl WireFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "counts" => Some(Self::Counts),
            _ => None,
        }
    }
}

impl Payload {
    pub fn to_wire(&self, format: WireFormat) -> serde_json::Result<Vec<u8>> {
        match format {
            WireFormat::Json => serde_json::to_vec(self),
            WireFormat::Counts => Ok(format!("{},{}\n", self.taken, self.empty).into_bytes()),
        }
    }
}

/// Encode a registry snapshot. Total over any number of spots.
pub fn encode(spots: &[Spot]) -> Payload {
    let taken = spots.iter().filter(|spot| spot.is_occupied()).count();
    Payload {
        group_a: pack_group(spots, &GROUP_1_2_8_9),
        group_b: pack_group(spots, &GROUP_3_4_10_11),
        group_c: pack_group(spots, &GROUP_5_6_12_13),
        group_d: pack_group(spots, &GROUP_7_14),
        taken,
        empty: spots.len() - taken,
        location: [0, 0],
    }
}

fn pack_group(spots: &[Spot], members: &[Option<usize>; 4]) -> u32 {
    members.iter().enumerate().fold(0, |acc, (i, member)| {
        let occupied = member
            .and_then(|position| spots.get(position - 1))
            .is_some_and(Spot::is_occupied);
        if occupied {
            acc | 1 << (3 - i)
        } else {
            acc
        }
    })
}
