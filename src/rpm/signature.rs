// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Composition of the signature section of an RPM package. */

use {
    super::{
        header::{self, Header},
        payload::Payload,
    },
    md5::Md5,
    sha1::{Digest, Sha1},
};

/// Produces the signature section of an RPM package.
///
/// Per [LSB, 25.2.3], the size and MD5 fields validate the header section
/// plus the payload, while the SHA-1 field validates only the header section.
pub(super) fn make_signature_section(header_section: &[u8], payload: &Payload) -> Vec<u8> {
    let mut h = Header::default();

    h.add_int32_value(
        header::SIGTAG_SIZE,
        &[(header_section.len() as u32 + payload.compressed_size) as i32],
    );
    h.add_int32_value(
        header::SIGTAG_PAYLOAD_SIZE,
        &[payload.uncompressed_size as i32],
    );

    h.add_string_value(
        header::SIGTAG_SHA1,
        &hex::encode(Sha1::digest(header_section)),
        false,
    );

    let mut md5 = Md5::new();
    md5.update(header_section);
    md5.update(&payload.bytes);
    h.add_binary_value(header::SIGTAG_MD5, &md5.finalize());

    h.to_binary(header::TAG_HEADER_SIGNATURES)
}
