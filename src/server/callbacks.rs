// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The callback table a slave dispatches requests through.
//!
//! Every method defaults to `ServerDeviceFailure`, so a type implementing
//! only the subset of registers/coils it actually backs still satisfies the
//! trait, matching the "missing callback" convention.

use crate::frame::{Address, ExceptionCode, Word};

/// User-supplied process image a slave `Instance` dispatches requests
/// against. Implement the handful of methods your device actually backs;
/// the rest answer `ServerDeviceFailure` by default.
pub trait Callbacks {
    /// Reads one coil (fc 0x01 data source, fc 0x05 read-modify path).
    fn read_coil(&mut self, address: Address) -> Result<bool, ExceptionCode> {
        let _ = address;
        Err(ExceptionCode::ServerDeviceFailure)
    }

    /// Reads one discrete input (fc 0x02 data source).
    fn read_discrete_input(&mut self, address: Address) -> Result<bool, ExceptionCode> {
        let _ = address;
        Err(ExceptionCode::ServerDeviceFailure)
    }

    /// Writes one coil (fc 0x05, fc 0x0F).
    fn write_coil(&mut self, address: Address, value: bool) -> Result<(), ExceptionCode> {
        let _ = (address, value);
        Err(ExceptionCode::ServerDeviceFailure)
    }

    /// Reads one holding register (fc 0x03, fc 0x16, fc 0x17 read phase).
    fn read_holding_register(&mut self, address: Address) -> Result<Word, ExceptionCode> {
        let _ = address;
        Err(ExceptionCode::ServerDeviceFailure)
    }

    /// Reads one input register (fc 0x04 data source).
    fn read_input_register(&mut self, address: Address) -> Result<Word, ExceptionCode> {
        let _ = address;
        Err(ExceptionCode::ServerDeviceFailure)
    }

    /// Writes one holding register (fc 0x06, fc 0x10, fc 0x16, fc 0x17 write phase).
    fn write_holding_register(&mut self, address: Address, value: Word) -> Result<(), ExceptionCode> {
        let _ = (address, value);
        Err(ExceptionCode::ServerDeviceFailure)
    }
}
