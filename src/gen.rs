// src/gen.rs
//
// Synthetic ITCH frame builder for benches, demos and tests. Frames come
// out exactly as the wire carries them: big-endian numerics, 6-byte
// timestamp, exact per-tag widths.

use crate::clock;
use crate::protocol::*;

fn frame(tag: u8, stock_locate: u16, tracking: u16, timestamp: u64, cap: usize) -> Vec<u8> {
    let mut f = Vec::with_capacity(cap);
    f.push(tag);
    f.extend_from_slice(&stock_locate.to_be_bytes());
    f.extend_from_slice(&tracking.to_be_bytes());
    // low 48 bits, network order
    f.extend_from_slice(&timestamp.to_be_bytes()[2..]);
    f
}

/// Space-pad a symbol to the 8-byte wire field. Longer symbols truncate.
pub fn pad_symbol(sym: &str) -> [u8; 8] {
    let mut s = [b' '; 8];
    let bytes = sym.as_bytes();
    let n = bytes.len().min(8);
    s[..n].copy_from_slice(&bytes[..n]);
    s
}

#[allow(clippy::too_many_arguments)]
pub fn add_order_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    order_ref: u64,
    side: u8,
    shares: u32,
    stock: &[u8; 8],
    price: u32,
) -> Vec<u8> {
    let mut f = frame(TAG_ADD_ORDER, stock_locate, tracking, timestamp, ADD_ORDER_LEN);
    f.extend_from_slice(&order_ref.to_be_bytes());
    f.push(side);
    f.extend_from_slice(&shares.to_be_bytes());
    f.extend_from_slice(stock);
    f.extend_from_slice(&price.to_be_bytes());
    f
}

pub fn execute_order_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    order_ref: u64,
    executed_shares: u32,
    match_number: u64,
) -> Vec<u8> {
    let mut f = frame(
        TAG_EXECUTE_ORDER,
        stock_locate,
        tracking,
        timestamp,
        EXECUTE_ORDER_LEN,
    );
    f.extend_from_slice(&order_ref.to_be_bytes());
    f.extend_from_slice(&executed_shares.to_be_bytes());
    f.extend_from_slice(&match_number.to_be_bytes());
    f
}

#[allow(clippy::too_many_arguments)]
pub fn execute_with_price_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    order_ref: u64,
    executed_shares: u32,
    match_number: u64,
    printable: u8,
    execution_price: u32,
) -> Vec<u8> {
    let mut f = frame(
        TAG_EXECUTE_WITH_PRICE,
        stock_locate,
        tracking,
        timestamp,
        EXECUTE_WITH_PRICE_LEN,
    );
    f.extend_from_slice(&order_ref.to_be_bytes());
    f.extend_from_slice(&executed_shares.to_be_bytes());
    f.extend_from_slice(&match_number.to_be_bytes());
    f.push(printable);
    f.extend_from_slice(&execution_price.to_be_bytes());
    f
}

pub fn order_cancel_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    order_ref: u64,
    cancelled_shares: u32,
) -> Vec<u8> {
    let mut f = frame(
        TAG_ORDER_CANCEL,
        stock_locate,
        tracking,
        timestamp,
        ORDER_CANCEL_LEN,
    );
    f.extend_from_slice(&order_ref.to_be_bytes());
    f.extend_from_slice(&cancelled_shares.to_be_bytes());
    f
}

pub fn order_delete_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    order_ref: u64,
) -> Vec<u8> {
    let mut f = frame(
        TAG_ORDER_DELETE,
        stock_locate,
        tracking,
        timestamp,
        ORDER_DELETE_LEN,
    );
    f.extend_from_slice(&order_ref.to_be_bytes());
    f
}

#[allow(clippy::too_many_arguments)]
pub fn order_replace_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    orig_order_ref: u64,
    new_order_ref: u64,
    shares: u32,
    price: u32,
) -> Vec<u8> {
    let mut f = frame(
        TAG_ORDER_REPLACE,
        stock_locate,
        tracking,
        timestamp,
        ORDER_REPLACE_LEN,
    );
    f.extend_from_slice(&orig_order_ref.to_be_bytes());
    f.extend_from_slice(&new_order_ref.to_be_bytes());
    f.extend_from_slice(&shares.to_be_bytes());
    f.extend_from_slice(&price.to_be_bytes());
    f
}

#[allow(clippy::too_many_arguments)]
pub fn trade_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    order_ref: u64,
    side: u8,
    shares: u32,
    stock: &[u8; 8],
    price: u32,
    match_number: u64,
) -> Vec<u8> {
    let mut f = frame(TAG_TRADE, stock_locate, tracking, timestamp, TRADE_LEN);
    f.extend_from_slice(&order_ref.to_be_bytes());
    f.push(side);
    f.extend_from_slice(&shares.to_be_bytes());
    f.extend_from_slice(stock);
    f.extend_from_slice(&price.to_be_bytes());
    f.extend_from_slice(&match_number.to_be_bytes());
    f
}

pub fn system_event_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    event_code: u8,
) -> Vec<u8> {
    let mut f = frame(
        TAG_SYSTEM_EVENT,
        stock_locate,
        tracking,
        timestamp,
        SYSTEM_EVENT_LEN,
    );
    f.push(event_code);
    f
}

pub fn stock_directory_frame(
    stock_locate: u16,
    tracking: u16,
    timestamp: u64,
    stock: &[u8; 8],
    round_lot_size: u32,
) -> Vec<u8> {
    let mut f = frame(
        TAG_STOCK_DIRECTORY,
        stock_locate,
        tracking,
        timestamp,
        STOCK_DIRECTORY_LEN,
    );
    f.extend_from_slice(stock);
    f.push(b'Q'); // market category
    f.push(b'N'); // financial status
    f.extend_from_slice(&round_lot_size.to_be_bytes());
    f.push(b'N'); // round lots only
    f.push(b'C'); // issue classification
    f.extend_from_slice(b"Z "); // issue sub-type
    f.push(b'P'); // authenticity
    f.push(b'N'); // short-sale threshold
    f.push(b'N'); // IPO flag
    f.push(b'1'); // LULD tier
    f.push(b'N'); // ETP flag
    f.extend_from_slice(&0u32.to_be_bytes());
    f.push(b'N'); // inverse
    f
}

/// One well-formed frame per supported tag, for coverage loops.
pub fn one_of_each() -> Vec<Vec<u8>> {
    let s = pad_symbol("AAPL");
    vec![
        add_order_frame(1, 1, 100, 10, b'B', 100, &s, 1_500_000),
        execute_order_frame(1, 2, 200, 10, 50, 900),
        execute_with_price_frame(1, 3, 300, 10, 25, 901, b'Y', 1_499_900),
        order_cancel_frame(1, 4, 400, 10, 10),
        order_delete_frame(1, 5, 500, 10),
        order_replace_frame(1, 6, 600, 10, 11, 200, 1_501_000),
        trade_frame(1, 7, 700, 12, b'S', 75, &s, 1_500_500, 902),
        system_event_frame(0, 8, 800, b'O'),
        stock_directory_frame(1, 9, 900, &s, 100),
    ]
}

/// Rolling-counter generator for the demo and benchmark binaries.
pub struct FrameGen {
    tracking: u16,
    order_ref: u64,
}

impl FrameGen {
    pub fn new() -> Self {
        Self {
            tracking: 0,
            order_ref: 1_000_000,
        }
    }

    fn next_ids(&mut self) -> (u16, u64, u64) {
        self.tracking = self.tracking.wrapping_add(1);
        self.order_ref += 1;
        (self.tracking, self.order_ref, clock::monotonic_nanos())
    }

    pub fn add_order(&mut self, sym: &str, side: u8, shares: u32, price: u32) -> Vec<u8> {
        let (trk, oref, ts) = self.next_ids();
        add_order_frame(1, trk, ts, oref, side, shares, &pad_symbol(sym), price)
    }

    pub fn execute_order(&mut self, shares: u32) -> Vec<u8> {
        let (trk, oref, ts) = self.next_ids();
        execute_order_frame(1, trk, ts, oref, shares, 5_000_000 + oref)
    }

    pub fn trade(&mut self, sym: &str, side: u8, shares: u32, price: u32) -> Vec<u8> {
        let (trk, oref, ts) = self.next_ids();
        trade_frame(
            1,
            trk,
            ts,
            oref,
            side,
            shares,
            &pad_symbol(sym),
            price,
            500_000 + oref,
        )
    }
}

impl Default for FrameGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_frames_have_declared_widths() {
        for f in one_of_each() {
            assert_eq!(frame_len(f[0]), Some(f.len()), "tag {}", f[0] as char);
        }
    }

    #[test]
    fn pad_symbol_pads_and_truncates() {
        assert_eq!(&pad_symbol("AAPL"), b"AAPL    ");
        assert_eq!(&pad_symbol("LONGSYMBOL"), b"LONGSYMB");
        assert_eq!(&pad_symbol(""), b"        ");
    }
}
