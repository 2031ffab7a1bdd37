// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The back-end for pacman packages (as used by Arch Linux and derivatives).

A pacman package is a `tar.xz` of the installed filesystem tree, with three
generated files at the archive root: `.PKGINFO` with package metadata, an
optional `.INSTALL` with the install scriptlets, and a gzipped `.MTREE`
listing every entry with its digests.
*/

mod mtree;
mod relations;

pub use relations::GroupResolver;

use {
    crate::{
        error::{PackageBuildError, Result},
        filesystem::{self, FsNode, NodeView, RegularFile, WalkControl},
        generator::Generator,
        package::{lookup_architecture, ActionKind, Architecture, Package},
        validation::{CompiledRegexSet, RegexSet},
    },
    once_cell::sync::Lazy,
    regex::Regex,
};

const ARCH_MAP: &[(Architecture, &'static str)] = &[
    (Architecture::Any, "any"),
    (Architecture::I386, "i686"),
    (Architecture::X86_64, "x86_64"),
    (Architecture::ARMv5, "arm"),
    (Architecture::ARMv6h, "armv6h"),
    (Architecture::ARMv7h, "armv7h"),
    (Architecture::AArch64, "aarch64"),
];

static REGEXES: Lazy<CompiledRegexSet> = Lazy::new(|| {
    RegexSet {
        package_name: "[a-z0-9@._+][a-z0-9@._+-]*",
        package_version: "[a-zA-Z0-9._]+",
        // requirements may carry the "except:" and "group:" prefixes
        related_name: "(?:except:)?(?:group:)?[a-z0-9@._+][a-z0-9@._+-]*",
        // incl. release/epoch
        related_version: "(?:[0-9]+:)?[a-zA-Z0-9._]+(?:-[1-9][0-9]*)?",
        format_name: "pacman",
    }
    .compile()
});

static WHITESPACE_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// The [Generator] for pacman packages.
pub struct PacmanGenerator {
    resolver: GroupResolver,
}

impl PacmanGenerator {
    pub fn new(resolver: GroupResolver) -> Self {
        Self { resolver }
    }
}

impl Generator for PacmanGenerator {
    fn validate(&self, pkg: &Package) -> Vec<PackageBuildError> {
        pkg.validate_with(&REGEXES, ARCH_MAP)
    }

    fn build(&self, pkg: &mut Package) -> Result<Vec<u8>> {
        pkg.prepare_build();

        write_pkginfo(pkg, &self.resolver)?;
        write_install(pkg);
        write_mtree(pkg)?;

        let mut buffer = vec![];
        filesystem::to_tar_xz_archive(&pkg.fs_root, &mut buffer, false, true)?;

        Ok(buffer)
    }

    fn recommended_file_name(&self, pkg: &Package) -> String {
        // this is called after Build(), so we can assume that package name,
        // version, etc. were already validated
        format!(
            "{}-{}-{}.pkg.tar.xz",
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

    // pacman does not accept dashes in version strings
    version.push_str(&pkg.version.replace('-', "_"));

    // a trailing alphabetic segment sorts before the bare version in
    // vercmp(8), which puts prereleases before the final release
    if let Some((kind, counter)) = pkg.prerelease.parts() {
        version.push_str(&format!("_{}.{}", kind, counter));
    }

    version.push_str(&format!("-{}", pkg.release));

    version
}

fn write_pkginfo(pkg: &mut Package, resolver: &GroupResolver) -> Result<()> {
    // normalize the package description like makepkg does
    let description = WHITESPACE_RX
        .replace_all(pkg.description.trim(), " ")
        .to_string();

    let mut contents = String::from("# Generated by linux-package-builder\n");
    contents.push_str(&format!("pkgname = {}\n", pkg.name));
    contents.push_str(&format!("pkgver = {}\n", full_version_string(pkg)));
    contents.push_str(&format!("pkgdesc = {}\n", description));
    contents.push_str("url = \n");
    if pkg.author.is_empty() {
        contents.push_str("packager = Unknown Packager\n");
    } else {
        contents.push_str(&format!("packager = {}\n", pkg.author));
    }
    contents.push_str(&format!("size = {}\n", pkg.fs_root.installed_size()));
    contents.push_str(&format!(
        "arch = {}\n",
        lookup_architecture(ARCH_MAP, pkg.architecture).unwrap_or("")
    ));
    contents.push_str("license = custom:none\n");

    contents.push_str(&relations::compile_relations("replaces", &pkg.replaces));
    contents.push_str(&relations::compile_relations("conflict", &pkg.conflicts));
    contents.push_str(&relations::compile_relations("provides", &pkg.provides));
    contents.push_str(&compile_backup_markers(pkg)?);
    contents.push_str(&relations::compile_requirements(
        "depend",
        &pkg.requires,
        resolver,
    )?);

    // these makepkgopt describe the behavior of this tool in makepkg's terms
    contents.push_str("makedepend = linux-package-builder\n");
    contents.push_str("makepkgopt = !strip\n");
    contents.push_str("makepkgopt = docs\n");
    contents.push_str("makepkgopt = libtool\n");
    contents.push_str("makepkgopt = staticlibs\n");
    contents.push_str("makepkgopt = emptydirs\n");
    contents.push_str("makepkgopt = !zipman\n");
    contents.push_str("makepkgopt = !purge\n");
    contents.push_str("makepkgopt = !upx\n");
    contents.push_str("makepkgopt = !debug\n");

    pkg.fs_root.entries.insert(
        ".PKGINFO".to_string(),
        FsNode::RegularFile(RegularFile::new(contents, 0o644)),
    );

    Ok(())
}

fn compile_backup_markers(pkg: &Package) -> Result<String> {
    let mut lines = vec![];
    pkg.walk_fs_relative(&mut |path, node| {
        if let NodeView::RegularFile(_) = node {
            // files delivered for the configuration management plugins are
            // not config files in pacman's sense
            if !path.starts_with("usr/share/holo/") {
                lines.push(format!("backup = {}\n", path));
            }
        }
        Ok(WalkControl::Continue)
    })?;
    lines.sort();

    Ok(lines.concat())
}

fn write_install(pkg: &mut Package) {
    let mut contents = String::new();
    let script = pkg.script(ActionKind::Setup);
    if !script.is_empty() {
        contents.push_str(&format!(
            "post_install() {{\n{}\n}}\npost_upgrade() {{\npost_install\n}}\n",
            script
        ));
    }
    let script = pkg.script(ActionKind::Cleanup);
    if !script.is_empty() {
        contents.push_str(&format!("post_remove() {{\n{}\n}}\n", script));
    }

    // do we need the .INSTALL file at all?
    if contents.is_empty() {
        return;
    }

    pkg.fs_root.entries.insert(
        ".INSTALL".to_string(),
        FsNode::RegularFile(RegularFile::new(contents, 0o644)),
    );
}

fn write_mtree(pkg: &mut Package) -> Result<()> {
    // runs after .PKGINFO and .INSTALL are in the tree, so both are listed
    let contents = mtree::make_mtree(pkg)?;

    pkg.fs_root.entries.insert(
        ".MTREE".to_string(),
        FsNode::RegularFile(RegularFile::new(contents, 0o644)),
    );

    Ok(())
}
