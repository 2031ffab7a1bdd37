// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Composition of the immutable header section of an RPM package. */

use {
    super::{
        header::{self, Header},
        payload::Payload,
    },
    crate::{
        error::Result,
        filesystem::{NodeView, WalkControl},
        package::{ActionKind, Package, PackageRelation, VersionConstraint},
    },
};

/// Produces the header section of an RPM package.
pub(super) fn make_header_section(
    pkg: &Package,
    payload: &Payload,
    architecture_name: &str,
    version: &str,
) -> Result<Vec<u8>> {
    let mut h = Header::default();

    add_package_information_tags(&mut h, pkg, architecture_name, version);
    h.add_int32_value(
        header::TAG_ARCHIVE_SIZE,
        &[payload.uncompressed_size as i32],
    );

    add_installation_tags(&mut h, pkg);

    add_file_information_tags(&mut h, pkg)?;

    add_dependency_information_tags(&mut h, pkg);

    Ok(h.to_binary(header::TAG_HEADER_IMMUTABLE))
}

// see [LSB, 25.2.4.1]
fn add_package_information_tags(h: &mut Header, pkg: &Package, architecture_name: &str, version: &str) {
    h.add_string_value(header::TAG_NAME, &pkg.name, false);
    h.add_string_value(header::TAG_VERSION, version, false);
    h.add_string_value(header::TAG_RELEASE, &pkg.release.to_string(), false);

    // summary = first line of description
    let summary = pkg.description.split('\n').next().unwrap_or("");
    h.add_string_value(header::TAG_SUMMARY, summary, true);
    h.add_string_value(header::TAG_DESCRIPTION, &pkg.description, true);

    h.add_int32_value(header::TAG_SIZE, &[pkg.fs_root.installed_size() as i32]);

    h.add_string_value(header::TAG_LICENSE, "None", false);

    if !pkg.author.is_empty() {
        h.add_string_value(header::TAG_PACKAGER, &pkg.author, false);
    }

    // the Group tag is considered optional by most RPM distributions these
    // days, but [LSB] says it's required
    h.add_string_value(header::TAG_GROUP, "System/Management", true);

    h.add_string_value(header::TAG_OS, "linux", false);
    h.add_string_value(header::TAG_ARCH, architecture_name, false);

    h.add_string_value(header::TAG_PAYLOAD_FORMAT, "cpio", false);
    h.add_string_value(header::TAG_PAYLOAD_COMPRESSOR, "lzma", false);
    h.add_string_value(header::TAG_PAYLOAD_FLAGS, "5", false);
}

// see [LSB, 25.2.4.2]
fn add_installation_tags(h: &mut Header, pkg: &Package) {
    let script = pkg.script(ActionKind::Setup);
    if !script.is_empty() {
        h.add_string_value(header::TAG_POST_IN, &script, false);
        h.add_string_value(header::TAG_POST_IN_PROG, "/bin/sh", false);
    }
    let script = pkg.script(ActionKind::Cleanup);
    if !script.is_empty() {
        h.add_string_value(header::TAG_POST_UN, &script, false);
        h.add_string_value(header::TAG_POST_UN_PROG, "/bin/sh", false);
    }
}

// see [LSB, 25.2.4.3]
//
// All arrays run in parallel over a single traversal, which must match the
// payload's traversal exactly (implicit directories skipped).
fn add_file_information_tags(h: &mut Header, pkg: &Package) -> Result<()> {
    let mut sizes: Vec<i32> = vec![];
    let mut modes: Vec<u16> = vec![];
    let mut rdevs: Vec<u16> = vec![];
    let mut mtimes: Vec<i32> = vec![];
    let mut md5s: Vec<String> = vec![];
    let mut linktos: Vec<String> = vec![];
    let mut flags: Vec<i32> = vec![];
    let mut owner_names: Vec<String> = vec![];
    let mut group_names: Vec<String> = vec![];
    let mut devices: Vec<i32> = vec![];
    let mut inodes: Vec<i32> = vec![];
    let mut langs: Vec<String> = vec![];
    let mut dir_indexes: Vec<i32> = vec![];
    let mut basenames: Vec<String> = vec![];
    let mut dirnames: Vec<String> = vec![];
    let mut inode_number: i32 = 0;

    pkg.walk_fs_absolute(&mut |path, node| {
        if let NodeView::Directory(dir) = node {
            if dir.implicit {
                return Ok(WalkControl::Continue);
            }
        }

        // make up inode numbers in the same way as rpmbuild does
        inode_number += 1;
        inodes.push(inode_number);
        langs.push(String::new());
        devices.push(1);
        rdevs.push(0);

        basenames.push(path_basename(path).to_string());
        let dir_index = find_or_append(&mut dirnames, path_dirname(path));
        dir_indexes.push(dir_index);

        modes.push(node.file_mode_for_archive(true) as u16);
        mtimes.push(0);

        match node {
            NodeView::Directory(dir) => {
                sizes.push(4096);
                md5s.push(String::new());
                linktos.push(String::new());
                flags.push(0);
                owner_names.push(id_to_string(dir.metadata.uid()));
                group_names.push(id_to_string(dir.metadata.gid()));
            }
            NodeView::RegularFile(file) => {
                sizes.push(file.content.len() as i32);
                md5s.push(file.md5_digest());
                linktos.push(String::new());
                flags.push(header::FILE_FLAG_NO_REPLACE);
                owner_names.push(id_to_string(file.metadata.uid()));
                group_names.push(id_to_string(file.metadata.gid()));
            }
            NodeView::Symlink(link) => {
                sizes.push(link.target.len() as i32);
                md5s.push(String::new());
                linktos.push(link.target.clone());
                flags.push(0);
                owner_names.push("root".to_string());
                group_names.push("root".to_string());
            }
        }

        Ok(WalkControl::Continue)
    })?;

    h.add_int32_value(header::TAG_FILE_SIZES, &sizes);
    h.add_int16_value(header::TAG_FILE_MODES, &modes);
    h.add_int16_value(header::TAG_FILE_RDEVS, &rdevs);
    h.add_int32_value(header::TAG_FILE_MTIMES, &mtimes);
    h.add_string_array_value(header::TAG_FILE_MD5S, &md5s);
    h.add_string_array_value(header::TAG_FILE_LINKTOS, &linktos);
    h.add_int32_value(header::TAG_FILE_FLAGS, &flags);
    h.add_string_array_value(header::TAG_FILE_USER_NAME, &owner_names);
    h.add_string_array_value(header::TAG_FILE_GROUP_NAME, &group_names);
    h.add_int32_value(header::TAG_FILE_DEVICES, &devices);
    h.add_int32_value(header::TAG_FILE_INODES, &inodes);
    h.add_string_array_value(header::TAG_FILE_LANGS, &langs);
    h.add_int32_value(header::TAG_DIR_INDEXES, &dir_indexes);
    h.add_string_array_value(header::TAG_BASENAMES, &basenames);
    h.add_string_array_value(header::TAG_DIR_NAMES, &dirnames);

    Ok(())
}

fn path_basename(path: &str) -> &str {
    if path == "/" {
        "/"
    } else {
        path.rsplit('/').next().unwrap_or(path)
    }
}

// the dirname carries a "/" suffix
fn path_dirname(path: &str) -> String {
    let dirname = match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    };

    if dirname.ends_with('/') {
        dirname.to_string()
    } else {
        format!("{}/", dirname)
    }
}

/// Returns the position of `value` in `list`, appending it first if missing.
fn find_or_append(list: &mut Vec<String>, value: String) -> i32 {
    if let Some(idx) = list.iter().position(|element| *element == value) {
        idx as i32
    } else {
        list.push(value);
        (list.len() - 1) as i32
    }
}

/// Renders a UID/GID into something that's maybe suitable for a
/// username/groupname field.
fn id_to_string(id: u32) -> String {
    if id == 0 {
        "root".to_string()
    } else {
        id.to_string()
    }
}

// see [LSB, 25.2.4.4]
fn add_dependency_information_tags(h: &mut Header, pkg: &Package) {
    serialize_relations(
        h,
        &pkg.requires,
        header::TAG_REQUIRE_NAME,
        header::TAG_REQUIRE_FLAGS,
        header::TAG_REQUIRE_VERSION,
    );
    serialize_relations(
        h,
        &pkg.provides,
        header::TAG_PROVIDE_NAME,
        header::TAG_PROVIDE_FLAGS,
        header::TAG_PROVIDE_VERSION,
    );
    serialize_relations(
        h,
        &pkg.conflicts,
        header::TAG_CONFLICT_NAME,
        header::TAG_CONFLICT_FLAGS,
        header::TAG_CONFLICT_VERSION,
    );
    serialize_relations(
        h,
        &pkg.replaces,
        header::TAG_OBSOLETE_NAME,
        header::TAG_OBSOLETE_FLAGS,
        header::TAG_OBSOLETE_VERSION,
    );
}

// marker for the flags of the rpmlib() pseudo-dependencies
const RPMLIB_RELATION: &str = "rpmlib";

// The requirements list describes not only package relations but also the
// structural features of this package file that the installing RPM needs to
// support, in the form of rpmlib() pseudo-dependencies.
const RPMLIB_PSEUDO_DEPENDENCIES: &[(&str, &str)] = &[
    // RPMTAG_PROVIDENAME and RPMTAG_OBSOLETENAME may have versions associated
    ("VersionedDependencies", "3.0.3-1"),
    // payload file names are represented in the RPMTAG_DIRINDEXES,
    // RPMTAG_DIRNAME and RPMTAG_BASENAMES indexes
    ("CompressedFileNames", "3.0.4-1"),
    ("PayloadIsLzma", "4.4.6-1"),
    // path names in the CPIO payload start with "./"
    ("PayloadFilesHavePrefix", "4.0-1"),
];

fn constraint_flags(relation: &str) -> i32 {
    match relation {
        "<" => header::SENSE_LESS,
        "<=" => header::SENSE_LESS | header::SENSE_EQUAL,
        "=" => header::SENSE_EQUAL,
        ">=" => header::SENSE_GREATER | header::SENSE_EQUAL,
        ">" => header::SENSE_GREATER,
        RPMLIB_RELATION => header::SENSE_RPMLIB | header::SENSE_LESS | header::SENSE_EQUAL,
        _ => header::SENSE_ANY,
    }
}

fn serialize_relations(
    h: &mut Header,
    relations: &[PackageRelation],
    names_tag: u32,
    flags_tag: u32,
    versions_tag: u32,
) {
    let mut relations = relations.to_vec();
    if names_tag == header::TAG_REQUIRE_NAME {
        for (name, version) in RPMLIB_PSEUDO_DEPENDENCIES {
            relations.push(PackageRelation {
                related_package: format!("rpmlib({})", name),
                constraints: vec![VersionConstraint::new(RPMLIB_RELATION, *version)],
            });
        }
    }

    // serialize relations into RPM's parallel-array format
    let mut names: Vec<String> = vec![];
    let mut flags: Vec<i32> = vec![];
    let mut versions: Vec<String> = vec![];
    for relation in &relations {
        if relation.constraints.is_empty() {
            // no version constraints: one relation for the related package
            names.push(relation.related_package.clone());
            flags.push(header::SENSE_ANY);
            versions.push(String::new());
        } else {
            // one relation per constraint
            for constraint in &relation.constraints {
                names.push(relation.related_package.clone());
                flags.push(constraint_flags(&constraint.relation));
                versions.push(constraint.version.clone());
            }
        }
    }

    h.add_string_array_value(names_tag, &names);
    h.add_int32_value(flags_tag, &flags);
    h.add_string_array_value(versions_tag, &versions);
}
