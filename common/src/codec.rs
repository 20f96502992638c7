use crate::error::{CodecError, CodecResult};
use crate::types::{message::FixMessage, tags};
use bytes::{BufMut, BytesMut};

/// Field separator byte.
pub const SOH: u8 = 0x01;

/// SendingTime emitted when the source message carries no tag 52.
pub const SENDING_TIME_SENTINEL: &str = "19700101-00:00:00.000";

/// Tags owned by the codec itself; everything else is a business field
/// and is emitted sorted ascending after the fixed header.
const HEADER_TAGS: [u32; 8] = [
    tags::BEGIN_STRING,
    tags::BODY_LENGTH,
    tags::CHECKSUM,
    tags::MSG_SEQ_NUM,
    tags::MSG_TYPE,
    tags::SENDER_COMP_ID,
    tags::SENDING_TIME,
    tags::TARGET_COMP_ID,
];

/// Everything the encoder needs beyond the business fields themselves.
#[derive(Debug, Clone)]
pub struct EncodeContext {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub msg_seq_num: u32,
    pub max_outbound_length: usize,
}

impl EncodeContext {
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
        msg_seq_num: u32,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            msg_seq_num,
            max_outbound_length: 8192,
        }
    }
}

/// A wire-correct encoded payload plus the metadata the transport layer
/// needs to hand it to an engine session.
#[derive(Debug, Clone)]
pub struct EncodedMessage {
    pub payload: Vec<u8>,
    pub msg_seq_num: u32,
    pub msg_type: String,
    pub packed_type: u64,
}

/// Encode a field map into a complete FIX payload.
///
/// Emission order is fixed: 8, 9, 35, 49, 56, 34, 52, then the remaining
/// business tags ascending. BodyLength counts the bytes between the SOH
/// after tag 9 and the SOH before tag 10; the checksum is the byte sum of
/// everything before `10=`, modulo 256, zero-padded to three digits.
pub fn encode(message: &FixMessage, ctx: &EncodeContext) -> CodecResult<EncodedMessage> {
    let msg_type = message
        .msg_type()
        .ok_or(CodecError::MissingTag(tags::MSG_TYPE))?
        .to_string();

    let sending_time = message
        .get(tags::SENDING_TIME)
        .filter(|v| !v.is_empty())
        .unwrap_or(SENDING_TIME_SENTINEL);

    // Body: everything between the tag-9 SOH and the tag-10 field.
    let mut body = BytesMut::with_capacity(256);
    put_field(&mut body, tags::MSG_TYPE, &msg_type)?;
    put_field(&mut body, tags::SENDER_COMP_ID, &ctx.sender_comp_id)?;
    put_field(&mut body, tags::TARGET_COMP_ID, &ctx.target_comp_id)?;
    put_field(&mut body, tags::MSG_SEQ_NUM, &ctx.msg_seq_num.to_string())?;
    put_field(&mut body, tags::SENDING_TIME, sending_time)?;
    for (tag, value) in message.iter() {
        if HEADER_TAGS.contains(&tag) {
            continue;
        }
        put_field(&mut body, tag, value)?;
    }

    let mut payload = BytesMut::with_capacity(body.len() + 32);
    put_field(&mut payload, tags::BEGIN_STRING, &ctx.begin_string)?;
    put_field(&mut payload, tags::BODY_LENGTH, &body.len().to_string())?;
    payload.extend_from_slice(&body);

    let checksum = payload.iter().fold(0u32, |sum, &b| sum + b as u32) % 256;
    payload.put_slice(format!("10={:03}", checksum).as_bytes());
    payload.put_u8(SOH);

    if payload.len() > ctx.max_outbound_length {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            limit: ctx.max_outbound_length,
        });
    }

    Ok(EncodedMessage {
        payload: payload.to_vec(),
        msg_seq_num: ctx.msg_seq_num,
        packed_type: packed_message_type(&msg_type),
        msg_type,
    })
}

fn put_field(buf: &mut BytesMut, tag: u32, value: &str) -> CodecResult<()> {
    buf.put_slice(tag.to_string().as_bytes());
    buf.put_u8(b'=');
    for ch in value.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(CodecError::NonLatin1 { tag });
        }
        buf.put_u8(code as u8);
    }
    buf.put_u8(SOH);
    Ok(())
}

/// Pack a one- or two-character MsgType code into a little-endian u64,
/// the representation engine sessions take alongside the raw payload.
pub fn packed_message_type(msg_type: &str) -> u64 {
    msg_type
        .bytes()
        .take(8)
        .enumerate()
        .fold(0u64, |packed, (i, b)| packed | (b as u64) << (8 * i))
}

/// Recompute the checksum of a complete payload (everything before the
/// final `10=` field), for verification in tests and diagnostics.
pub fn checksum_of(payload: &[u8]) -> Option<u8> {
    let tail = payload.windows(4).rposition(|w| w[0] == SOH && &w[1..4] == b"10=")?;
    let sum = payload[..=tail].iter().fold(0u32, |sum, &b| sum + b as u32);
    Some((sum % 256) as u8)
}
