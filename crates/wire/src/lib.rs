// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fish-wire: the RPC request/response/query DTOs and the length-prefixed
//! JSON framing used to carry them between a Fish node and its clients
//! (`spec.md` §6).

mod query;
mod request;
mod response;
mod stream;
mod wire;

pub use query::Query;
pub use request::Request;
pub use response::Response;
pub use stream::{ResyncRequired, StreamMessage, SubscribeMessage};
pub use wire::{decode, encode, read_message, write_message, ProtocolError, MAX_MESSAGE_BYTES};
