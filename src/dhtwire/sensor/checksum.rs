// Dhtwire - Interrupt-driven DHT22 decoder and read-out service
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::sensor::decode::frame_bytes;
use crate::sensor::session::FrameSnapshot;

/// Low 8 bits of the sum of the four payload bytes.
pub fn compute(bytes: [u8; 4]) -> u8 {
    // From the DHT22 datasheet:
    // > If the data transmission is right, check-sum should be the last 8 bit of
    // > "8 bit integral RH data+8 bit decimal RH data+8 bit integral T data+8 bit
    // > decimal T data".
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Return true if the checksum transmitted with the frame matches its data.
pub fn validate(snapshot: &FrameSnapshot) -> bool {
    let computed = compute(frame_bytes(snapshot.raw_frame));

    tracing::debug!(
        message = "computing checksum for sensor data",
        computed = computed,
        expected = snapshot.raw_checksum,
    );

    computed == snapshot.raw_checksum
}
