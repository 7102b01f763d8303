// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library error type

use thiserror::Error;

use crate::codec::pdu::ParseError;
use crate::frame::ExceptionCode;

/// A specialized [`Result`] type for Modbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Modbus errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer returned a Modbus exception response.
    #[error("Modbus exception: {0}")]
    Exception(ExceptionCode),

    /// A transport-level I/O failure (open/read/write/flush).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A received ADU's payload was not a well-formed PDU.
    #[error("malformed PDU: {0}")]
    Parse(#[from] ParseError),
}

impl From<ExceptionCode> for Error {
    fn from(code: ExceptionCode) -> Self {
        Error::Exception(code)
    }
}
