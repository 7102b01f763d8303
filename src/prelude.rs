// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types, re-exported for `use modbus_engine::prelude::*;`.

///////////////////////////////////////////////////////////////////
/// Core types
///////////////////////////////////////////////////////////////////
pub use crate::error::{Error, Result};
pub use crate::instance::{Instance, Role};
pub use crate::frame::{Address, ExceptionCode, Pdu, Quantity, Word};
pub use crate::master::TransactionOutcome;
pub use crate::slave::{Slave, SlaveId};
pub use crate::transport::{Timeouts, Transport};

///////////////////////////////////////////////////////////////////
/// Slave dispatch
///////////////////////////////////////////////////////////////////
pub use crate::server::Callbacks;

///////////////////////////////////////////////////////////////////
/// Transport backends
///////////////////////////////////////////////////////////////////
#[cfg(feature = "rtu")]
pub use crate::transport::serial::{SerialConfig, SerialTransport};

#[cfg(feature = "tcp")]
pub use crate::transport::tcp::{TcpConfig, TcpTransport};
