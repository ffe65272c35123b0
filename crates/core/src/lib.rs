pub mod address;
pub mod payload;
pub mod round;
pub mod ticket;

pub use address::{canonicalize, canonicalize_nonzero, checksum_normalize, checksummed, AddressError};
pub use payload::EncryptedPayload;
pub use round::{unix_now, NumberSpace, Round, RoundError, RoundStatus};
pub use ticket::{Ticket, TicketIntent, TicketStatus, TicketView};

/// Largest value the scheme's declared 32-bit integer type can carry
pub const ENCRYPTED_U32_MAX: u64 = u32::MAX as u64;

