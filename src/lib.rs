//! Lower Transport Layer for a Bluetooth Mesh stack.
//!
//! Sits between the upper transport layer (encrypted application/control
//! payloads) and the network layer (encrypted, obfuscated PDUs on the wire).
//! Splits outbound upper-transport PDUs into segment PDUs when they exceed
//! the single-frame payload budget ([`segmenter`]), and reassembles inbound
//! segments back into a coherent message while tracking arrivals with a
//! BlockAck bitmap and scheduling acknowledgements ([`reassembler`],
//! [`ack`]). [`lower`] is the bit-exact header codec both directions share.
//! [`layer::LowerTransportLayer`] is the facade a host stack drives.
//!
//! Network-layer encryption/obfuscation, upper-transport encryption, access-
//! layer opcode dispatch, provisioning, friendship/proxy features and GATT
//! bearer framing are out of scope; see [`callbacks`] for the capabilities
//! this crate expects its host stack to provide instead.
#![no_std]
#![allow(dead_code)]
extern crate alloc;

pub mod ack;
pub mod address;
pub mod callbacks;
pub mod config;
pub mod control;
pub mod error;
pub mod layer;
pub mod lower;
pub mod mesh;
pub mod message;
pub mod reassembler;
pub mod scheduler;
pub mod segmenter;
pub mod timer;
pub mod timestamp;

pub use config::SarConfig;
pub use error::Error;
pub use layer::LowerTransportLayer;
pub use message::{AccessMessage, ControlMessage, Message, MessageMeta, SessionKey};
