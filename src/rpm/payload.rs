// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The RPM payload: a CPIO archive in new ASCII format ("newc", magic
`070701`), compressed with LZMA. */

use {
    crate::{
        error::Result,
        filesystem::{NodeView, WalkControl},
        package::Package,
    },
    std::io::Write,
};

/// The compressed CPIO payload of a package, along with the sizes the
/// signature section has to record.
pub(super) struct Payload {
    pub bytes: Vec<u8>,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

const MAGIC: &[u8] = b"070701";

/// Generates the payload for the given package.
///
/// The traversal must visit nodes in exactly the same order as the file
/// information tags in the header section, skipping implicitly created
/// directories the same way rpmbuild-constructed archives do.
pub(super) fn make_payload(pkg: &Package) -> Result<Payload> {
    let mut buffer: Vec<u8> = vec![];
    let mut inode_number = 0u32;

    pkg.walk_fs_absolute(&mut |path, node| {
        if let NodeView::Directory(dir) = node {
            if dir.implicit {
                return Ok(WalkControl::Continue);
            }
        }

        // make up inode numbers in the same way as rpmbuild does
        inode_number += 1;

        // entry names are relative with a leading dot and NUL-terminated
        let mut name = Vec::with_capacity(path.len() + 2);
        name.push(b'.');
        name.extend_from_slice(path.as_bytes());
        name.push(0);

        let (uid, gid, data): (u32, u32, &[u8]) = match node {
            NodeView::Directory(dir) => (dir.metadata.uid(), dir.metadata.gid(), &[]),
            NodeView::RegularFile(file) => {
                (file.metadata.uid(), file.metadata.gid(), &file.content)
            }
            NodeView::Symlink(link) => (0, 0, link.target.as_bytes()),
        };

        write_entry_header(
            &mut buffer,
            EntryHeader {
                inode_number,
                mode: node.file_mode_for_archive(true),
                uid,
                gid,
                number_of_links: 1,
                file_size: data.len() as u32,
                name_size: name.len() as u32,
            },
        );
        write_padded(&mut buffer, &name);
        write_padded(&mut buffer, data);

        Ok(WalkControl::Continue)
    })?;

    // the trailer record indicates the end of the CPIO archive
    let trailer_name = b"TRAILER!!!\0";
    write_entry_header(
        &mut buffer,
        EntryHeader {
            inode_number: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            number_of_links: 1,
            file_size: 0,
            name_size: trailer_name.len() as u32,
        },
    );
    write_padded(&mut buffer, trailer_name);

    let uncompressed_size = buffer.len() as u32;

    let options = xz2::stream::LzmaOptions::new_preset(5)?;
    let stream = xz2::stream::Stream::new_lzma_encoder(&options)?;
    let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(&buffer)?;
    let bytes = encoder.finish()?;

    Ok(Payload {
        compressed_size: bytes.len() as u32,
        uncompressed_size,
        bytes,
    })
}

struct EntryHeader {
    inode_number: u32,
    mode: u32,
    uid: u32,
    gid: u32,
    number_of_links: u32,
    file_size: u32,
    name_size: u32,
}

fn write_entry_header(buffer: &mut Vec<u8>, header: EntryHeader) {
    buffer.extend_from_slice(MAGIC);
    for value in [
        header.inode_number,
        header.mode,
        header.uid,
        header.gid,
        header.number_of_links,
        0, // modification time
        header.file_size,
        0, // dev major
        0, // dev minor
        0, // rdev major
        0, // rdev minor
        header.name_size,
        0, // checksum
    ] {
        buffer.extend_from_slice(format!("{:08X}", value).as_bytes());
    }
}

// File names, contents and link targets end with padding to 4-byte alignment.
// The padding size cannot be computed from the data length alone since the
// stream is not necessarily 4-byte-aligned before the data.
fn write_padded(buffer: &mut Vec<u8>, data: &[u8]) {
    buffer.extend_from_slice(data);
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}
