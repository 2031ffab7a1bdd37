// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Serialization of a filesystem tree into tar archives.

Entries are emitted in walk order (name-sorted at every level) and every
timestamp is forced to the UNIX epoch, so the same tree always produces the
same bytes.
*/

use {
    crate::{
        error::Result,
        filesystem::{Directory, NodeView, WalkControl},
    },
    std::io::{Read, Write},
};

fn new_tar_header() -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);

    header
}

fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &str,
    is_directory: bool,
) -> Result<()> {
    // Tar archives consumed by package managers have filenames beginning
    // with `./`, and paths ending with `/` are directories. We cannot call
    // `header.set_path()` with `./` on anything except the root directory
    // because it will normalize away the `./` bit. So we set the header field
    // directly when adding directories and files.

    // We should only be dealing with GNU headers, which simplifies our code a bit.
    assert!(header.as_ustar().is_none());

    let value = format!("{}{}", path, if is_directory { "/" } else { "" });
    let value_bytes = value.as_bytes();

    let name_buffer = &mut header.as_old_mut().name;

    // If it fits within the buffer, copy it over.
    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Else we emit a special entry to extend the filename. Who knew tar
        // files were this jank.
        let mut header2 = tar::Header::new_gnu();
        let name = b"././@LongLink";
        header2.as_gnu_mut().unwrap().name[..name.len()].clone_from_slice(&name[..]);
        header2.set_mode(0o644);
        header2.set_uid(0);
        header2.set_gid(0);
        header2.set_mtime(0);
        header2.set_size(value_bytes.len() as u64 + 1);
        header2.set_entry_type(tar::EntryType::new(b'L'));
        header2.set_cksum();
        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&header2, &mut data)?;

        let truncated_bytes = &value_bytes[0..name_buffer.len()];
        name_buffer[0..truncated_bytes.len()].copy_from_slice(truncated_bytes);
    }

    Ok(())
}

/// Writes a tar archive containing `root` and all filesystem entries in it.
///
/// With `leading_dot = true`, entry paths look like `./foo/bar.conf`;
/// with `leading_dot = false`, like `foo/bar.conf`. With `skip_root = true`,
/// no entry is generated for the root directory itself.
pub fn to_tar_archive<W: Write>(
    root: &Directory,
    writer: W,
    leading_dot: bool,
    skip_root: bool,
) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    root.walk(".", &mut |path, node| {
        let path = if leading_dot {
            path
        } else {
            path.strip_prefix("./").unwrap_or(path)
        };
        if skip_root && path == "." {
            return Ok(WalkControl::Continue);
        }

        match node {
            NodeView::Directory(dir) => {
                let mut header = new_tar_header();
                header.set_entry_type(tar::EntryType::dir());
                header.set_mode(dir.file_mode_for_archive(false));
                header.set_uid(dir.metadata.uid() as u64);
                header.set_gid(dir.metadata.gid() as u64);
                header.set_size(0);
                if path == "." {
                    header.set_path("./")?;
                } else {
                    set_header_path(&mut builder, &mut header, path, true)?;
                }
                header.set_cksum();
                builder.append(&header, &mut std::io::empty())?;
            }
            NodeView::RegularFile(file) => {
                let mut header = new_tar_header();
                header.set_entry_type(tar::EntryType::file());
                header.set_mode(file.file_mode_for_archive(false));
                header.set_uid(file.metadata.uid() as u64);
                header.set_gid(file.metadata.gid() as u64);
                header.set_size(file.content.len() as u64);
                set_header_path(&mut builder, &mut header, path, false)?;
                header.set_cksum();
                builder.append(&header, &file.content[..])?;
            }
            NodeView::Symlink(link) => {
                let mut header = new_tar_header();
                header.set_entry_type(tar::EntryType::symlink());
                header.set_mode(link.file_mode_for_archive(false));
                header.set_size(0);
                header.set_link_name(&link.target)?;
                set_header_path(&mut builder, &mut header, path, false)?;
                header.set_cksum();
                builder.append(&header, &mut std::io::empty())?;
            }
        }

        Ok(WalkControl::Continue)
    })?;

    builder.finish()?;

    Ok(())
}

/// Identical to [to_tar_archive], but gzip-compresses the result.
pub fn to_tar_gz_archive<W: Write>(
    root: &Directory,
    writer: W,
    leading_dot: bool,
    skip_root: bool,
) -> Result<()> {
    let header = libflate::gzip::HeaderBuilder::new().finish();
    let mut encoder = libflate::gzip::Encoder::with_options(
        writer,
        libflate::gzip::EncodeOptions::new().header(header),
    )?;

    to_tar_archive(root, &mut encoder, leading_dot, skip_root)?;
    encoder.finish().into_result()?;

    Ok(())
}

/// Identical to [to_tar_archive], but xz-compresses the result.
pub fn to_tar_xz_archive<W: Write>(
    root: &Directory,
    writer: W,
    leading_dot: bool,
    skip_root: bool,
) -> Result<()> {
    let mut encoder = xz2::write::XzEncoder::new(writer, 6);

    to_tar_archive(root, &mut encoder, leading_dot, skip_root)?;
    encoder.finish()?;

    Ok(())
}
