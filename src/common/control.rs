// bthplug Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Typed request/response exchanges over a [`DeviceIo`].

use crate::driver::{ControlCode, DeviceIo, DriverError};
use crate::protocol::{self, WireRecord};
use crate::{Error, Result};
use log::{trace, warn};

/// Allocates a zeroed driver buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
    buf.resize(size, 0);
    Ok(buf)
}

pub(crate) fn send(
    io: &dyn DeviceIo,
    code: ControlCode,
    input: &[u8],
    output: &mut [u8],
) -> Result<usize> {
    trace!(
        "{:?}: control request {:?} ({} bytes in, {} bytes out)",
        io,
        code,
        input.len(),
        output.len()
    );
    io.control(code, input, output).map_err(|e| {
        trace!("{:?}: {:?} failed: {}", io, code, e);
        Error::Driver(e)
    })
}

/// Sends a request whose response is a single `T`.
pub(crate) fn query<T: WireRecord>(io: &dyn DeviceIo, code: ControlCode, input: &[u8]) -> Result<T> {
    let mut output = alloc_buffer(T::SIZE)?;
    let written = send(io, code, input, &mut output)?;
    let response = output.get(..written).ok_or_else(|| {
        warn!(
            "{:?}: {:?} reports {} bytes written into a buffer of {}",
            io,
            code,
            written,
            output.len()
        );
        Error::Other(format!(
            "Overlong response to {:?}: {} of {} bytes",
            code,
            written,
            T::SIZE
        ))
    })?;
    T::from_bytes(response).ok_or_else(|| {
        Error::Other(format!(
            "Short response to {:?}: {} of {} bytes",
            code,
            written,
            T::SIZE
        ))
    })
}

/// Sends a listing request whose element count is not known in advance.
///
/// Starts with room for one element and, whenever the driver reports more elements than the
/// buffer holds, retries with the reported count. Gives up with
/// [`DriverError::BufferTooSmall`] after `max_attempts` requests. An empty list is reported as
/// [`Error::NoMoreItems`].
pub(crate) fn query_list<T: WireRecord>(
    io: &dyn DeviceIo,
    code: ControlCode,
    max_attempts: usize,
) -> Result<Vec<T>> {
    let max_attempts = max_attempts.max(1);
    let mut capacity = 1;
    let mut attempt = 1;
    loop {
        let size = protocol::list_size::<T>(capacity).ok_or(Error::OutOfMemory)?;
        let mut output = alloc_buffer(size)?;
        let status = io.control(code, &[], &mut output);
        let reported = protocol::list_count(&output) as usize;
        match status {
            Ok(_) => {}
            Err(DriverError::BufferTooSmall) if reported > capacity => {}
            Err(e) => return Err(e.into()),
        }

        if reported == 0 {
            return Err(Error::NoMoreItems);
        }
        if reported <= capacity {
            return Ok(protocol::decode_list(&output, reported));
        }
        if attempt >= max_attempts {
            warn!(
                "{:?}: {:?} still reports {} elements after {} attempts",
                io, code, reported, attempt
            );
            return Err(DriverError::BufferTooSmall.into());
        }
        trace!(
            "{:?}: {:?} reported {} elements for a buffer of {}, retrying",
            io,
            code,
            reported,
            capacity
        );
        capacity = reported;
        attempt += 1;
    }
}
