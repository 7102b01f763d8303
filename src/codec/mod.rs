// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire codecs: PDU encoding/decoding and the two ADU framings built on
//! top of it.

pub mod pdu;
pub mod rtu;
pub mod tcp;
