// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport-facing pieces: the abstract duplex stream trait and the
//! single-threaded, non-blocking I/O task built on top of it.

pub mod byte_stream;
pub mod io_task;

pub use byte_stream::{BoxedByteStream, ByteStream};
pub use io_task::{IoCommand, IoCommandSender, IoEvent, IoTask, IoTaskHandle};
