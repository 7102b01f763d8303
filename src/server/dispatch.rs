// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `Instance::slave_step`: one iteration of the receive/dispatch/transmit
//! loop a slave runs.

use bytes::Bytes;

use crate::codec::pdu::{pack_coils, unpack_coils};
use crate::error::{Error, Result as EngineResult};
use crate::frame::{
    Address, ExceptionCode, Pdu, Quantity, Word, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER,
};
use crate::instance::Instance;
use crate::wire::{bytes_to_words, words_to_bytes};

use super::callbacks::Callbacks;

impl Instance {
    /// Runs one iteration of the slave receive/dispatch/transmit loop.
    ///
    /// Returns `Ok(())` whether or not anything was actually processed this
    /// iteration (no frame yet, a malformed frame, a frame addressed to
    /// another slave) — the caller is expected to call this in a tight
    /// loop, per §4.8. Only a transport failure is `Err`.
    pub fn slave_step<C: Callbacks>(&mut self, callbacks: &mut C) -> EngineResult<()> {
        let (request, origin) = match self.receive_request() {
            Ok(Some(pair)) => pair,
            Ok(None) => return Ok(()),
            Err(Error::Parse(err)) => {
                log::debug!("dropping malformed request: {err}");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !self.accepts(&origin) {
            log::trace!("dropping request not addressed to this instance");
            return Ok(());
        }

        let Some(response) = dispatch(request, callbacks) else {
            return Ok(());
        };
        self.send_response(origin, &response)
    }
}

/// Dispatches one parsed request PDU against `callbacks`, returning the
/// response PDU to send (normal or exception). `None` means the request
/// carries no reply-worthy shape (shouldn't occur for a PDU parsed with
/// `Direction::Request`, but matched exhaustively for safety).
fn dispatch<C: Callbacks>(request: Pdu, callbacks: &mut C) -> Option<Pdu> {
    match request {
        Pdu::ReadRequest {
            function,
            address,
            quantity,
        } => Some(match function {
            FC_READ_COILS => read_bits(function, address, quantity, |a| callbacks.read_coil(a)),
            FC_READ_DISCRETE_INPUTS => {
                read_bits(function, address, quantity, |a| callbacks.read_discrete_input(a))
            }
            FC_READ_HOLDING_REGISTERS => {
                read_registers(function, address, quantity, |a| callbacks.read_holding_register(a))
            }
            FC_READ_INPUT_REGISTERS => {
                read_registers(function, address, quantity, |a| callbacks.read_input_register(a))
            }
            _ => Pdu::exception(function, ExceptionCode::IllegalFunction),
        }),
        Pdu::WriteSingle {
            function,
            address,
            value,
        } => Some(match function {
            FC_WRITE_SINGLE_COIL => write_single_coil(function, address, value, callbacks),
            FC_WRITE_SINGLE_REGISTER => match callbacks.write_holding_register(address, value) {
                Ok(()) => Pdu::WriteSingle {
                    function,
                    address,
                    value,
                },
                Err(code) => Pdu::exception(function, code),
            },
            _ => Pdu::exception(function, ExceptionCode::IllegalFunction),
        }),
        Pdu::WriteMultipleRequest {
            function,
            address,
            quantity,
            payload,
        } => Some(match function {
            FC_WRITE_MULTIPLE_COILS => write_multiple_coils(function, address, quantity, &payload, callbacks),
            FC_WRITE_MULTIPLE_REGISTERS => {
                write_multiple_registers(function, address, quantity, &payload, callbacks)
            }
            _ => Pdu::exception(function, ExceptionCode::IllegalFunction),
        }),
        Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        } => Some(mask_write(address, and_mask, or_mask, callbacks)),
        Pdu::ReadWriteMultipleRequest {
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            payload,
        } => Some(read_write_multiple(
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            &payload,
            callbacks,
        )),
        Pdu::Custom { function, .. } => Some(Pdu::exception(function, ExceptionCode::IllegalFunction)),
        Pdu::ReadResponse { .. }
        | Pdu::WriteMultipleResponse { .. }
        | Pdu::ReadWriteMultipleResponse { .. }
        | Pdu::Exception { .. } => {
            log::warn!("dispatch received a response-shaped PDU; ignoring");
            None
        }
    }
}

fn read_bits(
    function: u8,
    address: Address,
    quantity: Quantity,
    mut read: impl FnMut(Address) -> Result<bool, ExceptionCode>,
) -> Pdu {
    let mut bits = Vec::with_capacity(quantity as usize);
    for offset in 0..quantity {
        match read(address.wrapping_add(offset)) {
            Ok(bit) => bits.push(bit),
            Err(code) => return Pdu::exception(function, code),
        }
    }
    Pdu::ReadResponse {
        function,
        payload: Bytes::from(pack_coils(&bits)),
    }
}

fn read_registers(
    function: u8,
    address: Address,
    quantity: Quantity,
    mut read: impl FnMut(Address) -> Result<Word, ExceptionCode>,
) -> Pdu {
    let mut words = Vec::with_capacity(quantity as usize);
    for offset in 0..quantity {
        match read(address.wrapping_add(offset)) {
            Ok(word) => words.push(word),
            Err(code) => return Pdu::exception(function, code),
        }
    }
    Pdu::ReadResponse {
        function,
        payload: Bytes::from(words_to_bytes(&words)),
    }
}

fn write_single_coil<C: Callbacks>(function: u8, address: Address, value: Word, callbacks: &mut C) -> Pdu {
    let bit = match value {
        0x0000 => false,
        0xFF00 => true,
        _ => return Pdu::exception(function, ExceptionCode::IllegalDataValue),
    };
    match callbacks.write_coil(address, bit) {
        Ok(()) => Pdu::WriteSingle {
            function,
            address,
            value,
        },
        Err(code) => Pdu::exception(function, code),
    }
}

fn write_multiple_coils<C: Callbacks>(
    function: u8,
    address: Address,
    quantity: Quantity,
    payload: &[u8],
    callbacks: &mut C,
) -> Pdu {
    for (offset, bit) in unpack_coils(payload, quantity).into_iter().enumerate() {
        if let Err(code) = callbacks.write_coil(address.wrapping_add(offset as u16), bit) {
            return Pdu::exception(function, code);
        }
    }
    Pdu::WriteMultipleResponse {
        function,
        address,
        quantity,
    }
}

fn write_multiple_registers<C: Callbacks>(
    function: u8,
    address: Address,
    quantity: Quantity,
    payload: &[u8],
    callbacks: &mut C,
) -> Pdu {
    for (offset, word) in bytes_to_words(payload).into_iter().enumerate() {
        if let Err(code) = callbacks.write_holding_register(address.wrapping_add(offset as u16), word) {
            return Pdu::exception(function, code);
        }
    }
    Pdu::WriteMultipleResponse {
        function,
        address,
        quantity,
    }
}

/// `new = (current AND and_mask) OR (or_mask AND NOT and_mask)`. The read
/// and the write are both fallible; no partial state survives a write
/// failure since the computed value is only committed once.
fn mask_write<C: Callbacks>(address: Address, and_mask: Word, or_mask: Word, callbacks: &mut C) -> Pdu {
    let current = match callbacks.read_holding_register(address) {
        Ok(word) => word,
        Err(code) => return Pdu::exception(crate::frame::FC_MASK_WRITE_REGISTER, code),
    };
    let new_value = (current & and_mask) | (or_mask & !and_mask);
    match callbacks.write_holding_register(address, new_value) {
        Ok(()) => Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        },
        Err(code) => Pdu::exception(crate::frame::FC_MASK_WRITE_REGISTER, code),
    }
}

/// Writes first, then reads; a mid-sequence write failure aborts before any
/// read is attempted, per §4.9.
fn read_write_multiple<C: Callbacks>(
    read_address: Address,
    read_quantity: Quantity,
    write_address: Address,
    write_quantity: Quantity,
    write_payload: &[u8],
    callbacks: &mut C,
) -> Pdu {
    let function = crate::frame::FC_READ_WRITE_MULTIPLE_REGISTERS;
    for (offset, word) in bytes_to_words(write_payload).into_iter().enumerate() {
        if let Err(code) = callbacks.write_holding_register(write_address.wrapping_add(offset as u16), word) {
            return Pdu::exception(function, code);
        }
    }
    let mut words = Vec::with_capacity(read_quantity as usize);
    for offset in 0..read_quantity {
        match callbacks.read_holding_register(read_address.wrapping_add(offset)) {
            Ok(word) => words.push(word),
            Err(code) => return Pdu::exception(function, code),
        }
    }
    Pdu::ReadWriteMultipleResponse {
        payload: Bytes::from(words_to_bytes(&words)),
    }
}
