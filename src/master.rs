// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master transaction core: the ten request/response operations a master
//! `Instance` can run against a slave.

use bytes::Bytes;

use crate::codec::pdu::{check_quantity, pack_coils, unpack_coils};
use crate::error::{Error, Result};
use crate::frame::{
    Address, Pdu, Quantity, Word, FC_MASK_WRITE_REGISTER, FC_READ_COILS,
    FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_READ_WRITE_MULTIPLE_REGISTERS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER,
};
use crate::instance::Instance;

/// The outcome of one master transaction: `Ok(Some(_))` on a normal
/// response, `Ok(None)` if the slave never answered within the configured
/// timeouts, `Err` for a protocol exception or transport failure.
pub type TransactionOutcome<T> = Result<Option<T>>;

impl Instance {
    fn run(&mut self, request: Pdu) -> Result<Option<Pdu>> {
        log::debug!("master request: {request:?}");
        let response = self.transact(&request)?;
        match &response {
            Some(Pdu::Exception { function, code }) => {
                log::debug!("slave returned exception 0x{code:02X} for function 0x{function:02X}", code = *code as u8);
                return Err(Error::Exception(*code));
            }
            Some(pdu) => log::trace!("master response: {pdu:?}"),
            None => log::debug!("master transaction timed out"),
        }
        Ok(response)
    }

    /// Reads `quantity` coils starting at `address` (fc 0x01).
    pub fn read_coils(&mut self, address: Address, quantity: Quantity) -> TransactionOutcome<Vec<bool>> {
        check_quantity(FC_READ_COILS, quantity)?;
        let request = Pdu::ReadRequest {
            function: FC_READ_COILS,
            address,
            quantity,
        };
        match self.run(request)? {
            Some(Pdu::ReadResponse { payload, .. }) => {
                Ok(Some(unpack_coils(&payload, quantity)))
            }
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Reads `quantity` discrete inputs starting at `address` (fc 0x02).
    pub fn read_discrete_inputs(
        &mut self,
        address: Address,
        quantity: Quantity,
    ) -> TransactionOutcome<Vec<bool>> {
        check_quantity(FC_READ_DISCRETE_INPUTS, quantity)?;
        let request = Pdu::ReadRequest {
            function: FC_READ_DISCRETE_INPUTS,
            address,
            quantity,
        };
        match self.run(request)? {
            Some(Pdu::ReadResponse { payload, .. }) => {
                Ok(Some(unpack_coils(&payload, quantity)))
            }
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Reads `quantity` holding registers starting at `address` (fc 0x03).
    pub fn read_holding_registers(
        &mut self,
        address: Address,
        quantity: Quantity,
    ) -> TransactionOutcome<Vec<Word>> {
        check_quantity(FC_READ_HOLDING_REGISTERS, quantity)?;
        let request = Pdu::ReadRequest {
            function: FC_READ_HOLDING_REGISTERS,
            address,
            quantity,
        };
        match self.run(request)? {
            Some(Pdu::ReadResponse { payload, .. }) => {
                Ok(Some(crate::wire::bytes_to_words(&payload)))
            }
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Reads `quantity` input registers starting at `address` (fc 0x04).
    pub fn read_input_registers(
        &mut self,
        address: Address,
        quantity: Quantity,
    ) -> TransactionOutcome<Vec<Word>> {
        check_quantity(FC_READ_INPUT_REGISTERS, quantity)?;
        let request = Pdu::ReadRequest {
            function: FC_READ_INPUT_REGISTERS,
            address,
            quantity,
        };
        match self.run(request)? {
            Some(Pdu::ReadResponse { payload, .. }) => {
                Ok(Some(crate::wire::bytes_to_words(&payload)))
            }
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Writes a single coil (fc 0x05). Echoes back the address written on
    /// success, as the wire protocol does.
    pub fn write_single_coil(&mut self, address: Address, value: bool) -> TransactionOutcome<()> {
        let request = Pdu::WriteSingle {
            function: FC_WRITE_SINGLE_COIL,
            address,
            value: if value { 0xFF00 } else { 0x0000 },
        };
        match self.run(request)? {
            Some(Pdu::WriteSingle { .. }) => Ok(Some(())),
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Writes a single holding register (fc 0x06).
    pub fn write_single_register(&mut self, address: Address, value: Word) -> TransactionOutcome<()> {
        let request = Pdu::WriteSingle {
            function: FC_WRITE_SINGLE_REGISTER,
            address,
            value,
        };
        match self.run(request)? {
            Some(Pdu::WriteSingle { .. }) => Ok(Some(())),
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Writes multiple coils starting at `address` (fc 0x0F).
    pub fn write_multiple_coils(&mut self, address: Address, values: &[bool]) -> TransactionOutcome<()> {
        let quantity = values.len() as Quantity;
        check_quantity(FC_WRITE_MULTIPLE_COILS, quantity)?;
        let request = Pdu::WriteMultipleRequest {
            function: FC_WRITE_MULTIPLE_COILS,
            address,
            quantity,
            payload: Bytes::from(pack_coils(values)),
        };
        match self.run(request)? {
            Some(Pdu::WriteMultipleResponse { .. }) => Ok(Some(())),
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Writes multiple holding registers starting at `address` (fc 0x10).
    pub fn write_multiple_registers(&mut self, address: Address, values: &[Word]) -> TransactionOutcome<()> {
        let quantity = values.len() as Quantity;
        check_quantity(FC_WRITE_MULTIPLE_REGISTERS, quantity)?;
        let request = Pdu::WriteMultipleRequest {
            function: FC_WRITE_MULTIPLE_REGISTERS,
            address,
            quantity,
            payload: Bytes::from(crate::wire::words_to_bytes(values)),
        };
        match self.run(request)? {
            Some(Pdu::WriteMultipleResponse { .. }) => Ok(Some(())),
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Masks a holding register in place: `new = (old & and_mask) | (or_mask & !and_mask)` (fc 0x16).
    pub fn mask_write_register(
        &mut self,
        address: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> TransactionOutcome<()> {
        let request = Pdu::MaskWrite {
            address,
            and_mask,
            or_mask,
        };
        match self.run(request)? {
            Some(Pdu::MaskWrite { .. }) => Ok(Some(())),
            Some(Pdu::Custom { function, .. }) if function == FC_MASK_WRITE_REGISTER => {
                Ok(Some(()))
            }
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }

    /// Reads and writes holding registers in one transaction (fc 0x17).
    pub fn read_write_multiple_registers(
        &mut self,
        read_address: Address,
        read_quantity: Quantity,
        write_address: Address,
        write_values: &[Word],
    ) -> TransactionOutcome<Vec<Word>> {
        check_quantity(FC_READ_HOLDING_REGISTERS, read_quantity)?;
        let write_quantity = write_values.len() as Quantity;
        check_quantity(FC_WRITE_MULTIPLE_REGISTERS, write_quantity)?;
        let request = Pdu::ReadWriteMultipleRequest {
            read_address,
            read_quantity,
            write_address,
            write_quantity,
            payload: Bytes::from(crate::wire::words_to_bytes(write_values)),
        };
        match self.run(request)? {
            Some(Pdu::ReadWriteMultipleResponse { payload }) => {
                Ok(Some(crate::wire::bytes_to_words(&payload)))
            }
            Some(_) => Err(Error::Io(unexpected_response())),
            None => Ok(None),
        }
    }
}

fn unexpected_response() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "response function code did not match the request",
    )
}

// Master operations are exercised end-to-end in `tests/`, against the
// loopback transport, since every one of them needs a live `Instance`.
