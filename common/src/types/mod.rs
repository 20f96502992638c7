pub mod entry;
pub mod message;
pub mod raw;
pub mod session;

/// FIX tag numbers used throughout the harness.
pub mod tags {
    /// BeginString (FIX version).
    pub const BEGIN_STRING: u32 = 8;
    /// Body length.
    pub const BODY_LENGTH: u32 = 9;
    /// Checksum.
    pub const CHECKSUM: u32 = 10;
    /// Client order ID.
    pub const CL_ORD_ID: u32 = 11;
    /// Execution ID.
    pub const EXEC_ID: u32 = 17;
    /// Message sequence number.
    pub const MSG_SEQ_NUM: u32 = 34;
    /// Message type.
    pub const MSG_TYPE: u32 = 35;
    /// Order ID.
    pub const ORDER_ID: u32 = 37;
    /// Original client order ID.
    pub const ORIG_CL_ORD_ID: u32 = 41;
    /// Sender CompID.
    pub const SENDER_COMP_ID: u32 = 49;
    /// Sending time.
    pub const SENDING_TIME: u32 = 52;
    /// Symbol.
    pub const SYMBOL: u32 = 55;
    /// Target CompID.
    pub const TARGET_COMP_ID: u32 = 56;
    /// Transact time.
    pub const TRANSACT_TIME: u32 = 60;
    /// OrigSendingTime, set on possDup resends.
    pub const ORIG_SENDING_TIME: u32 = 122;
    /// Quote request ID.
    pub const QUOTE_REQ_ID: u32 = 131;
}

/// Admin message types (session level), excluded from business routing
/// unless explicitly enabled.
pub const ADMIN_MSG_TYPES: [&str; 6] = ["0", "1", "2", "4", "5", "A"];

/// True when the msgType is a FIX session-level message.
pub fn is_admin_msg_type(msg_type: &str) -> bool {
    ADMIN_MSG_TYPES.contains(&msg_type)
}
