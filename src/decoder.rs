// src/decoder.rs
//
// Fixed-dispatch ITCH frame decoder: one length-delimited frame in, one
// tagged record out, constant time, no allocation. The two empirically
// hottest tags (Add Order ~40% of a live feed, Execute Order ~25%) are
// tested ahead of the dense match, with branch hints on the guard checks.
//
// The only failure mode is `None`: short frame, unknown tag, or a length
// that does not exactly equal the width declared for the tag. Counting
// misdecodes belongs to the transport feeding this function.

use crate::clock;
use crate::protocol::*;
use crate::util::{likely, unlikely};

#[inline]
pub fn decode(frame: &[u8]) -> Option<Record> {
    if unlikely(frame.len() < HEADER_LEN) {
        return None;
    }
    let tag = frame[0];

    if likely(tag == TAG_ADD_ORDER) {
        if unlikely(frame.len() != ADD_ORDER_LEN) {
            return None;
        }
        return Some(decode_add_order(frame));
    }
    if likely(tag == TAG_EXECUTE_ORDER) {
        if unlikely(frame.len() != EXECUTE_ORDER_LEN) {
            return None;
        }
        return Some(decode_execute_order(frame));
    }

    match tag {
        TAG_EXECUTE_WITH_PRICE if frame.len() == EXECUTE_WITH_PRICE_LEN => {
            Some(decode_execute_with_price(frame))
        }
        TAG_ORDER_CANCEL if frame.len() == ORDER_CANCEL_LEN => Some(decode_order_cancel(frame)),
        TAG_ORDER_DELETE if frame.len() == ORDER_DELETE_LEN => Some(decode_order_delete(frame)),
        TAG_ORDER_REPLACE if frame.len() == ORDER_REPLACE_LEN => Some(decode_order_replace(frame)),
        TAG_TRADE if frame.len() == TRADE_LEN => Some(decode_trade(frame)),
        TAG_SYSTEM_EVENT if frame.len() == SYSTEM_EVENT_LEN => Some(decode_system_event(frame)),
        TAG_STOCK_DIRECTORY if frame.len() == STOCK_DIRECTORY_LEN => {
            Some(decode_stock_directory(frame))
        }
        _ => None,
    }
}

// Field extraction at fixed offsets. Lengths are validated by the caller,
// so the slice indexing below cannot go out of bounds.

#[inline]
fn header(frame: &[u8]) -> Header {
    Header {
        tag: frame[0],
        stock_locate: be_u16(&frame[1..]),
        tracking_number: be_u16(&frame[3..]),
        timestamp: be_u48(&frame[5..]),
    }
}

#[inline]
fn stock(frame: &[u8], off: usize) -> [u8; 8] {
    let mut s = [0u8; 8];
    s.copy_from_slice(&frame[off..off + 8]);
    s
}

#[inline]
fn stamp(body: Body) -> Record {
    Record {
        body,
        ingress_ts: clock::now(),
    }
}

#[inline]
fn decode_add_order(frame: &[u8]) -> Record {
    stamp(Body::AddOrder(AddOrder {
        header: header(frame),
        order_ref: be_u64(&frame[11..]),
        side: frame[19],
        shares: be_u32(&frame[20..]),
        stock: stock(frame, 24),
        price: be_u32(&frame[32..]),
    }))
}

#[inline]
fn decode_execute_order(frame: &[u8]) -> Record {
    stamp(Body::ExecuteOrder(ExecuteOrder {
        header: header(frame),
        order_ref: be_u64(&frame[11..]),
        executed_shares: be_u32(&frame[19..]),
        match_number: be_u64(&frame[23..]),
    }))
}

#[inline]
fn decode_execute_with_price(frame: &[u8]) -> Record {
    stamp(Body::ExecuteOrderWithPrice(ExecuteOrderWithPrice {
        header: header(frame),
        order_ref: be_u64(&frame[11..]),
        executed_shares: be_u32(&frame[19..]),
        match_number: be_u64(&frame[23..]),
        printable: frame[31],
        execution_price: be_u32(&frame[32..]),
    }))
}

#[inline]
fn decode_order_cancel(frame: &[u8]) -> Record {
    stamp(Body::OrderCancel(OrderCancel {
        header: header(frame),
        order_ref: be_u64(&frame[11..]),
        cancelled_shares: be_u32(&frame[19..]),
    }))
}

#[inline]
fn decode_order_delete(frame: &[u8]) -> Record {
    stamp(Body::OrderDelete(OrderDelete {
        header: header(frame),
        order_ref: be_u64(&frame[11..]),
    }))
}

#[inline]
fn decode_order_replace(frame: &[u8]) -> Record {
    stamp(Body::OrderReplace(OrderReplace {
        header: header(frame),
        orig_order_ref: be_u64(&frame[11..]),
        new_order_ref: be_u64(&frame[19..]),
        shares: be_u32(&frame[27..]),
        price: be_u32(&frame[31..]),
    }))
}

#[inline]
fn decode_trade(frame: &[u8]) -> Record {
    stamp(Body::Trade(Trade {
        header: header(frame),
        order_ref: be_u64(&frame[11..]),
        side: frame[19],
        shares: be_u32(&frame[20..]),
        stock: stock(frame, 24),
        price: be_u32(&frame[32..]),
        match_number: be_u64(&frame[36..]),
    }))
}

#[inline]
fn decode_system_event(frame: &[u8]) -> Record {
    stamp(Body::SystemEvent(SystemEvent {
        header: header(frame),
        event_code: frame[11],
    }))
}

#[inline]
fn decode_stock_directory(frame: &[u8]) -> Record {
    stamp(Body::StockDirectory(StockDirectory {
        header: header(frame),
        stock: stock(frame, 11),
        market_category: frame[19],
        financial_status: frame[20],
        round_lot_size: be_u32(&frame[21..]),
        round_lots_only: frame[25],
        issue_classification: frame[26],
        issue_sub_type: [frame[27], frame[28]],
        authenticity: frame[29],
        short_sale_threshold: frame[30],
        ipo_flag: frame[31],
        luld_tier: frame[32],
        etp_flag: frame[33],
        etp_leverage: be_u32(&frame[34..]),
        inverse: frame[38],
    }))
}
