// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The RPM lead, the fixed-layout first 96 bytes of an RPM file. */

use crate::package::Package;

/// Serializes the lead for the given package.
///
/// All multi-byte fields are big-endian. The name-version-release string
/// occupies 66 bytes and is always NUL-terminated, truncating the name if
/// necessary.
pub(super) fn make_lead(pkg: &Package, architecture_id: u16, full_version: &str) -> Vec<u8> {
    let mut lead = Vec::with_capacity(96);

    // magic
    lead.extend_from_slice(&[0xed, 0xab, 0xee, 0xdb]);
    // file format version 3.0
    lead.extend_from_slice(&[0x03, 0x00]);
    // type: binary package
    lead.extend_from_slice(&0u16.to_be_bytes());
    lead.extend_from_slice(&architecture_id.to_be_bytes());

    let nvr = format!("{}-{}", pkg.name, full_version);
    let nvr_bytes = nvr.as_bytes();
    for idx in 0..65 {
        lead.push(*nvr_bytes.get(idx).unwrap_or(&0));
    }
    // must be a NUL-terminated string
    lead.push(0);

    // operating system: Linux
    lead.extend_from_slice(&1u16.to_be_bytes());
    // signature type: a signature section follows
    lead.extend_from_slice(&5u16.to_be_bytes());
    lead.extend_from_slice(&[0u8; 16]);

    lead
}
