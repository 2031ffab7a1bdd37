// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Composition of the `.MTREE` metadata file, per mtree(5). */

use {
    crate::{
        error::Result,
        filesystem::{NodeView, WalkControl},
        package::Package,
    },
    std::io::Write,
};

/// Generates the gzipped mtree metadata for this package.
///
/// Attributes appear in the same order as makepkg writes them:
/// `type,uid,gid,mode,size,md5digest,sha256digest,link`, with the defaults
/// declared in the leading `/set` line omitted.
pub(super) fn make_mtree(pkg: &Package) -> Result<Vec<u8>> {
    let mut lines = vec![
        "#mtree".to_string(),
        "/set type=file uid=0 gid=0 mode=644 time=0.0".to_string(),
    ];

    pkg.walk_fs_absolute(&mut |path, node| {
        // skip root directory
        if path == "/" {
            return Ok(WalkControl::Continue);
        }

        // make the path relative, e.g. "./etc/foo.conf"
        let mut line = escape(&format!(".{}", path));

        match node {
            NodeView::Directory(dir) => {
                line.push_str(" type=dir");
                if dir.metadata.uid() != 0 {
                    line.push_str(&format!(" uid={}", dir.metadata.uid()));
                }
                if dir.metadata.gid() != 0 {
                    line.push_str(&format!(" gid={}", dir.metadata.gid()));
                }
                if dir.metadata.mode != 0o644 {
                    line.push_str(&format!(" mode={:o}", dir.metadata.mode));
                }
            }
            NodeView::RegularFile(file) => {
                // type=file is the default
                if file.metadata.uid() != 0 {
                    line.push_str(&format!(" uid={}", file.metadata.uid()));
                }
                if file.metadata.gid() != 0 {
                    line.push_str(&format!(" gid={}", file.metadata.gid()));
                }
                if file.metadata.mode != 0o644 {
                    line.push_str(&format!(" mode={:o}", file.metadata.mode));
                }
                line.push_str(&format!(
                    " size={} md5digest={} sha256digest={}",
                    file.content.len(),
                    file.md5_digest(),
                    file.sha256_digest()
                ));
            }
            NodeView::Symlink(link) => {
                line.push_str(" type=link mode=777");
                // spaces separate attributes, so the target needs escaping too
                line.push_str(&format!(" link={}", escape(&link.target)));
            }
        }

        lines.push(line);
        Ok(WalkControl::Continue)
    })?;

    let contents = lines.join("\n") + "\n";

    let header = libflate::gzip::HeaderBuilder::new().finish();
    let mut encoder = libflate::gzip::Encoder::with_options(
        Vec::new(),
        libflate::gzip::EncodeOptions::new().header(header),
    )?;
    encoder.write_all(contents.as_bytes())?;

    Ok(encoder.finish().into_result()?)
}

// From the mtree(5) manpage:
//
// > When encoding file or pathnames, any backslash character or character
// > outside of the 95 printable ASCII characters must be encoded as a
// > backslash followed by three octal digits.
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for byte in input.bytes() {
        if byte > b' ' && byte <= b'~' && byte != b'\\' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{:03o}", byte));
        }
    }

    out
}
