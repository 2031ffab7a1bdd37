// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The back-end for Debian packages.

A `.deb` file is an `ar` archive with three members in fixed order: the
`debian-binary` version marker, a `control.tar.gz` with package metadata, and
a `data.tar.xz` with the delivered filesystem tree. The format is documented
at <https://manpages.debian.org/unstable/dpkg-dev/deb.5.en.html>.
*/

use {
    crate::{
        error::{PackageBuildError, Result},
        filesystem::{self, Directory, FsNode, NodeView, RegularFile, WalkControl},
        generator::Generator,
        package::{lookup_architecture, Architecture, ActionKind, Package, PackageRelation},
        validation::{CompiledRegexSet, RegexSet},
    },
    once_cell::sync::Lazy,
};

const ARCH_MAP: &[(Architecture, &'static str)] = &[
    (Architecture::Any, "all"),
    (Architecture::I386, "i386"),
    (Architecture::X86_64, "amd64"),
    (Architecture::ARMv5, "armel"),
    // Architecture::ARMv6h is not supported by Debian
    (Architecture::ARMv7h, "armhf"),
    (Architecture::AArch64, "arm64"),
];

// reference: https://www.debian.org/doc/debian-policy/ch-controlfields.html
static REGEXES: Lazy<CompiledRegexSet> = Lazy::new(|| {
    RegexSet {
        package_name: "[a-z0-9][a-z0-9+-.]+",
        package_version: "[0-9][A-Za-z0-9.+:~-]*",
        related_name: "[a-z0-9][a-z0-9+-.]+",
        // incl. release/epoch
        related_version: "(?:[0-9]+:)?[0-9][A-Za-z0-9.+:~-]*(?:-[1-9][0-9]*)?",
        format_name: "Debian",
    }
    .compile()
});

/// The [Generator] for Debian packages.
pub struct DebianGenerator;

impl Generator for DebianGenerator {
    fn validate(&self, pkg: &Package) -> Vec<PackageBuildError> {
        let mut errors = pkg.validate_with(&REGEXES, ARCH_MAP);

        if pkg.author.is_empty() {
            errors.push(PackageBuildError::validation(
                "The \"package.author\" field is required for Debian packages",
            ));
        }

        for relation in &pkg.provides {
            if !relation.constraints.is_empty() {
                errors.push(PackageBuildError::validation(format!(
                    "version constraints on \"Provides: {}\" are not allowed for Debian packages",
                    relation.related_package
                )));
            }
        }

        errors
    }

    fn build(&self, pkg: &mut Package) -> Result<Vec<u8>> {
        pkg.prepare_build();

        let mut data_tar = vec![];
        filesystem::to_tar_xz_archive(&pkg.fs_root, &mut data_tar, true, false)?;

        let control_tar = build_control_tar(pkg)?;

        build_ar_archive(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", control_tar),
            ("data.tar.xz", data_tar),
        ])
    }

    fn recommended_file_name(&self, pkg: &Package) -> String {
        // this is called after Build(), so we can assume that package name,
        // version, etc. were already validated
        format!(
            "{}_{}_{}.deb",
            pkg.name,
            full_version_string(pkg),
            lookup_architecture(ARCH_MAP, pkg.architecture).unwrap_or("")
        )
    }
}

fn full_version_string(pkg: &Package) -> String {
    let mut version = String::new();

    if pkg.epoch > 0 {
        version.push_str(&format!("{}:", pkg.epoch));
    }

    version.push_str(&pkg.version);

    if let Some((kind, counter)) = pkg.prerelease.parts() {
        version.push_str(&format!("~{}.{}", kind, counter));
    }

    version.push_str(&format!("-{}", pkg.release));

    version
}

fn build_control_tar(pkg: &Package) -> Result<Vec<u8>> {
    // prepare a directory into which to put all the metadata files
    let mut control_dir = Directory::new();

    control_dir.entries.insert(
        "control".to_string(),
        FsNode::RegularFile(RegularFile::new(make_control_file(pkg), 0o644)),
    );
    control_dir.entries.insert(
        "md5sums".to_string(),
        FsNode::RegularFile(RegularFile::new(make_md5sums_file(pkg)?, 0o644)),
    );

    // maintainer scripts are only written when they have content
    let script = pkg.script(ActionKind::Setup);
    if !script.is_empty() {
        control_dir.entries.insert(
            "postinst".to_string(),
            FsNode::RegularFile(RegularFile::new(format!("#!/bin/bash\n{}\n", script), 0o755)),
        );
    }

    let script = pkg.script(ActionKind::Cleanup);
    if !script.is_empty() {
        control_dir.entries.insert(
            "postrm".to_string(),
            FsNode::RegularFile(RegularFile::new(format!("#!/bin/bash\n{}\n", script), 0o755)),
        );
    }

    let mut buffer = vec![];
    filesystem::to_tar_gz_archive(&control_dir, &mut buffer, true, false)?;

    Ok(buffer)
}

// reference for this file:
// https://www.debian.org/doc/debian-policy/ch-controlfields.html#s-binarycontrolfiles
fn make_control_file(pkg: &Package) -> String {
    let mut contents = format!("Package: {}\n", pkg.name);
    contents.push_str(&format!("Version: {}\n", full_version_string(pkg)));
    contents.push_str(&format!(
        "Architecture: {}\n",
        lookup_architecture(ARCH_MAP, pkg.architecture).unwrap_or("")
    ));
    contents.push_str(&format!("Maintainer: {}\n", pkg.author));
    // convert bytes to KiB
    contents.push_str(&format!(
        "Installed-Size: {}\n",
        pkg.fs_root.installed_size() / 1024
    ));
    contents.push_str("Section: misc\n");
    contents.push_str("Priority: optional\n");

    contents.push_str(&compile_relations("Depends", &pkg.requires));
    contents.push_str(&compile_relations("Provides", &pkg.provides));
    contents.push_str(&compile_relations("Conflicts", &pkg.conflicts));
    contents.push_str(&compile_relations("Replaces", &pkg.replaces));

    // we have only one description field, which we use both as the synopsis
    // and the extended description
    let mut description = pkg.description.replace('\n', " ").trim().to_string();
    if description.is_empty() {
        // the description field is strictly required
        description = pkg.name.trim().to_string();
    }
    contents.push_str(&format!("Description: {}\n {}\n", description, description));

    contents
}

fn compile_relations(relation_kind: &str, relations: &[PackageRelation]) -> String {
    if relations.is_empty() {
        return String::new();
    }

    let mut entries = Vec::with_capacity(relations.len());
    for relation in relations {
        if relation.constraints.is_empty() {
            entries.push(relation.related_package.clone());
        } else {
            // operators "<" and ">" become "<<" and ">>" here
            for constraint in &relation.constraints {
                let operator = match constraint.relation.as_str() {
                    "<" => "<<",
                    ">" => ">>",
                    other => other,
                };
                entries.push(format!(
                    "{} ({} {})",
                    relation.related_package, operator, constraint.version
                ));
            }
        }
    }

    format!("{}: {}\n", relation_kind, entries.join(", "))
}

fn make_md5sums_file(pkg: &Package) -> Result<String> {
    // calculate MD5 sums for all regular files in this package
    let mut lines = String::new();
    pkg.walk_fs_relative(&mut |path, node| {
        if let NodeView::RegularFile(file) = node {
            lines.push_str(&format!("{}  {}\n", file.md5_digest(), path));
        }
        Ok(WalkControl::Continue)
    })?;

    Ok(lines)
}

fn build_ar_archive(entries: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut builder = ar::Builder::new(Vec::new());

    for (name, data) in entries {
        let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        // modification time 0 and root ownership keep the archive reproducible
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(0o100644);
        builder.append(&header, &data[..])?;
    }

    Ok(builder.into_inner()?)
}
