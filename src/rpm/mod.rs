// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The back-end for RPM packages.

An RPM file consists of four consecutive regions: a fixed 96-byte lead, a
signature header, the immutable header with the actual package metadata, and
a CPIO payload compressed with LZMA. Both headers use the same key-value
structure and must start on an 8-byte boundary relative to the start of the
file.

Documentation for the file format:

- [LSB] <http://refspecs.linux-foundation.org/LSB_5.0.0/LSB-Core-generic/LSB-Core-generic/pkgformat.html>
- [RPM] <http://www.rpm.org/max-rpm/s1-rpm-file-format-rpm-file-format.html>
*/

mod header;
mod lead;
mod metadata;
mod payload;
mod signature;

use crate::{
    error::{PackageBuildError, Result},
    generator::Generator,
    package::{lookup_architecture, Architecture, Package},
};

// Source for this data: `grep arch_canon /usr/lib/rpm/rpmrc`
const ARCH_MAP: &[(Architecture, &'static str)] = &[
    (Architecture::Any, "noarch"),
    (Architecture::I386, "i686"),
    (Architecture::X86_64, "x86_64"),
    (Architecture::ARMv5, "armv5tl"),
    (Architecture::ARMv6h, "armv6hl"),
    (Architecture::ARMv7h, "armv7hl"),
    (Architecture::AArch64, "aarch64"),
];

const ARCH_ID_MAP: &[(Architecture, u16)] = &[
    (Architecture::Any, 0),
    (Architecture::I386, 1),
    (Architecture::X86_64, 1),
    (Architecture::ARMv5, 12),
    (Architecture::ARMv6h, 12),
    (Architecture::ARMv7h, 12),
    (Architecture::AArch64, 12),
];

/// The [Generator] for RPM packages.
pub struct RpmGenerator;

impl Generator for RpmGenerator {
    fn validate(&self, _pkg: &Package) -> Vec<PackageBuildError> {
        // there is no reliable cross-distribution source of truth for the
        // acceptable format of RPM package names and versions, so only the
        // format-agnostic checks apply
        vec![]
    }

    fn build(&self, pkg: &mut Package) -> Result<Vec<u8>> {
        pkg.prepare_build();

        // assemble the CPIO-LZMA payload
        let payload = payload::make_payload(pkg)?;

        // produce the sections in reverse order, since most of them depend on
        // what comes after them
        let header_section = metadata::make_header_section(
            pkg,
            &payload,
            architecture_name(pkg),
            &version_string(pkg),
        )?;
        let signature_section = signature::make_signature_section(&header_section, &payload);
        let lead = lead::make_lead(pkg, architecture_id(pkg), &full_version_string(pkg));

        // combine everything with the correct alignment
        let mut combined = lead;
        append_aligned_to_8_byte(&mut combined, &signature_section);
        append_aligned_to_8_byte(&mut combined, &header_section);
        combined.extend_from_slice(&payload.bytes);

        Ok(combined)
    }

    fn recommended_file_name(&self, pkg: &Package) -> String {
        // this is called after Build(), so we can assume that package name,
        // version, etc. were already validated
        format!(
            "{}-{}.{}.rpm",
            pkg.name,
            full_version_string(pkg),
            architecture_name(pkg)
        )
    }
}

fn architecture_name(pkg: &Package) -> &'static str {
    lookup_architecture(ARCH_MAP, pkg.architecture).unwrap_or("")
}

fn architecture_id(pkg: &Package) -> u16 {
    ARCH_ID_MAP
        .iter()
        .find(|(arch, _)| *arch == pkg.architecture)
        .map(|(_, id)| *id)
        .unwrap_or(0)
}

/// The version as recorded in the immutable header, without the release.
fn version_string(pkg: &Package) -> String {
    let mut version = String::new();

    if pkg.epoch > 0 {
        version.push_str(&format!("{}:", pkg.epoch));
    }

    version.push_str(&pkg.version);

    if let Some((kind, counter)) = pkg.prerelease.parts() {
        version.push_str(&format!("~{}.{}", kind, counter));
    }

    version
}

fn full_version_string(pkg: &Package) -> String {
    format!("{}-{}", version_string(pkg), pkg.release)
}

// According to [LSB, 25.2.2], "A Header structure shall be aligned to an
// 8 byte boundary."
fn append_aligned_to_8_byte(buffer: &mut Vec<u8>, section: &[u8]) {
    while buffer.len() % 8 != 0 {
        buffer.push(0x00);
    }
    buffer.extend_from_slice(section);
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            filesystem::{FsNode, RegularFile},
            package::{PackageRelation, Prerelease, VersionConstraint},
        },
        md5::Md5,
        sha1::{Digest, Sha1},
    };

    fn sample_package() -> Package {
        let mut pkg = Package::new("hello", "1.0");
        pkg.description = "A sample package".to_string();
        pkg.insert_fs_node(
            "/etc/hello.conf",
            FsNode::RegularFile(RegularFile::new(b"hi\n".to_vec(), 0o644)),
        )
        .unwrap();
        pkg
    }

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    // Locates the signature section, immutable header section and payload
    // inside a built RPM.
    fn split_rpm(rpm: &[u8]) -> (&[u8], &[u8], &[u8]) {
        let section_len = |start: usize| -> usize {
            assert_eq!(&rpm[start..start + 4], &[0x8e, 0xad, 0xe8, 0x01]);
            let record_count = read_u32(rpm, start + 8) as usize;
            let data_size = read_u32(rpm, start + 12) as usize;
            16 + record_count * 16 + data_size
        };

        let sig_start = 96;
        let sig_len = section_len(sig_start);
        let mut header_start = sig_start + sig_len;
        while header_start % 8 != 0 {
            header_start += 1;
        }
        let header_len = section_len(header_start);
        (
            &rpm[sig_start..sig_start + sig_len],
            &rpm[header_start..header_start + header_len],
            &rpm[header_start + header_len..],
        )
    }

    #[test]
    fn test_version_strings() {
        let mut pkg = Package::new("hello", "2.1");
        assert_eq!(version_string(&pkg), "2.1");
        assert_eq!(full_version_string(&pkg), "2.1-1");

        pkg.epoch = 3;
        pkg.prerelease = Prerelease::Alpha(2);
        pkg.release = 5;
        assert_eq!(version_string(&pkg), "3:2.1~alpha.2");
        assert_eq!(full_version_string(&pkg), "3:2.1~alpha.2-5");
    }

    #[test]
    fn test_recommended_file_name() {
        let mut pkg = sample_package();
        assert_eq!(
            RpmGenerator.recommended_file_name(&pkg),
            "hello-1.0-1.noarch.rpm"
        );

        pkg.architecture = Architecture::X86_64;
        assert_eq!(
            RpmGenerator.recommended_file_name(&pkg),
            "hello-1.0-1.x86_64.rpm"
        );
    }

    #[test]
    fn test_lead_and_alignment() -> Result<()> {
        let mut pkg = sample_package();
        let rpm = RpmGenerator.build(&mut pkg)?;

        assert_eq!(&rpm[0..4], &[0xed, 0xab, 0xee, 0xdb]);

        // the signature section starts right at the 8-byte-aligned offset 96
        assert_eq!(&rpm[96..100], &[0x8e, 0xad, 0xe8, 0x01]);

        let (_, header_section, _) = split_rpm(&rpm);
        let header_offset = header_section.as_ptr() as usize - rpm.as_ptr() as usize;
        assert_eq!(header_offset % 8, 0);

        Ok(())
    }

    #[test]
    fn test_signature_digests_match_sections() -> Result<()> {
        let mut pkg = sample_package();
        let rpm = RpmGenerator.build(&mut pkg)?;
        let (signature_section, header_section, payload) = split_rpm(&rpm);

        // the SHA-1 is stored as a NUL-terminated string in the data store
        let mut sha1_needle = hex::encode(Sha1::digest(header_section)).into_bytes();
        sha1_needle.push(0);
        assert!(
            signature_section
                .windows(sha1_needle.len())
                .any(|window| window == sha1_needle.as_slice()),
            "SHA-1 of the header section recorded"
        );

        let mut md5 = Md5::new();
        md5.update(header_section);
        md5.update(payload);
        let md5 = md5.finalize();
        assert!(
            signature_section
                .windows(md5.len())
                .any(|window| window == md5.as_slice()),
            "MD5 of header and payload recorded"
        );

        Ok(())
    }

    #[test]
    fn test_requirements_include_rpmlib_pseudo_dependencies() -> Result<()> {
        let mut pkg = sample_package();
        pkg.requires = vec![PackageRelation {
            related_package: "linux".to_string(),
            constraints: vec![VersionConstraint::new(">=", "4.14")],
        }];
        let rpm = RpmGenerator.build(&mut pkg)?;
        let (_, header_section, _) = split_rpm(&rpm);

        let require_names = [
            &b"linux\0"[..],
            b"rpmlib(VersionedDependencies)\0",
            b"rpmlib(CompressedFileNames)\0",
            b"rpmlib(PayloadIsLzma)\0",
            b"rpmlib(PayloadFilesHavePrefix)\0",
        ];
        let mut last_position = 0;
        for name in require_names {
            let position = header_section
                .windows(name.len())
                .position(|window| window == name)
                .unwrap_or_else(|| panic!("requirement {:?} present", name));
            assert!(position > last_position, "requirements appear in order");
            last_position = position;
        }

        assert!(
            header_section
                .windows(5)
                .any(|window| window == b"4.14\0"),
            "constraint version recorded"
        );

        Ok(())
    }

    #[test]
    fn test_deterministic_build() -> Result<()> {
        let mut first_pkg = sample_package();
        let mut second_pkg = first_pkg.clone();

        assert_eq!(
            RpmGenerator.build(&mut first_pkg)?,
            RpmGenerator.build(&mut second_pkg)?
        );

        Ok(())
    }
}
