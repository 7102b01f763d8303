// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The slave side: a user-supplied [`Callbacks`] process image, dispatched
//! against by [`crate::instance::Instance::slave_step`].

pub mod callbacks;
mod dispatch;

pub use callbacks::Callbacks;
