// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory representation of the filesystem tree a package installs.

The tree is rooted at a [Directory] and contains [RegularFile] and [Symlink]
leaves. All iteration over directory entries is name-sorted, so archives
emitted from the same tree are always laid out identically.
*/

mod tar;

pub use self::tar::{to_tar_archive, to_tar_gz_archive, to_tar_xz_archive};

use {
    crate::error::{PackageBuildError, Result},
    md5::{Digest, Md5},
    sha2::Sha256,
    std::collections::BTreeMap,
};

/// An owner or group reference in node metadata.
///
/// Numeric ids can be embedded in archives directly. Names cannot be resolved
/// to ids at build time and must be postponed into the package's setup script
/// (see [Directory::postpone_unmaterializable]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IdOrName {
    Id(u32),
    Name(String),
}

/// Metadata shared by directories and regular files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeMetadata {
    /// Permission bits, e.g. `0o644`.
    pub mode: u32,
    pub owner: Option<IdOrName>,
    pub group: Option<IdOrName>,
}

impl NodeMetadata {
    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            owner: None,
            group: None,
        }
    }

    /// The numeric owner id, if one is set.
    pub fn uid(&self) -> u32 {
        match self.owner {
            Some(IdOrName::Id(id)) => id,
            _ => 0,
        }
    }

    /// The numeric group id, if one is set.
    pub fn gid(&self) -> u32 {
        match self.group {
            Some(IdOrName::Id(id)) => id,
            _ => 0,
        }
    }

    /// Extracts name-form ownership into a shell script line and clears it
    /// from the metadata. Numeric ownership is left in place.
    fn postpone_unmaterializable(&mut self, path: &str) -> String {
        let owner = match &self.owner {
            Some(IdOrName::Name(name)) => {
                let name = name.clone();
                self.owner = None;
                Some(name)
            }
            _ => None,
        };
        let group = match &self.group {
            Some(IdOrName::Name(name)) => {
                let name = name.clone();
                self.group = None;
                Some(name)
            }
            _ => None,
        };

        match (owner, group) {
            (Some(owner), Some(group)) => format!("chown {}:{} {}\n", owner, group, path),
            (Some(owner), None) => format!("chown {} {}\n", owner, path),
            (None, Some(group)) => format!("chgrp {} {}\n", group, path),
            (None, None) => String::new(),
        }
    }
}

/// A directory node, holding its entries keyed by name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Directory {
    pub entries: BTreeMap<String, FsNode>,
    pub metadata: NodeMetadata,
    /// Whether this directory was spawned implicitly to hold a descendant
    /// rather than being declared. An implicit directory may be replaced
    /// silently by a later declared directory at the same path.
    pub implicit: bool,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            metadata: NodeMetadata::new(0o755),
            implicit: false,
        }
    }

    fn new_implicit() -> Self {
        let mut dir = Self::new();
        dir.implicit = true;
        dir
    }

    /// Inserts a new node below this directory.
    ///
    /// `rel_path` contains the path to the new node split on slashes, e.g.
    /// `["var", "lib", "foo"]` for `"var/lib/foo"`. Intermediate directories
    /// are spawned implicitly. `location` is the absolute path of this
    /// directory and is only used for error reporting.
    ///
    /// Inserting where an entry already exists fails with
    /// [PackageBuildError::DuplicateEntry], unless the existing entry is an
    /// implicit directory and the new node is a directory, in which case the
    /// new directory adopts the implicit directory's entries and replaces it.
    pub fn insert(&mut self, entry: FsNode, rel_path: &[&str], location: &str) -> Result<()> {
        let (subname, rest) = match rel_path.split_first() {
            Some(split) => split,
            None => return Err(PackageBuildError::DuplicateEntry),
        };

        if rest.is_empty() {
            let mut entry = entry;
            if let Some(existing) = self.entries.get_mut(*subname) {
                match (existing, &mut entry) {
                    (FsNode::Directory(old), FsNode::Directory(new)) if old.implicit => {
                        // don't lose the entries below the implicitly created
                        // directory
                        for (name, node) in std::mem::take(&mut old.entries) {
                            new.entries.insert(name, node);
                        }
                    }
                    _ => return Err(PackageBuildError::DuplicateEntry),
                }
            }
            self.entries.insert((*subname).to_string(), entry);
            return Ok(());
        }

        let subentry = self
            .entries
            .entry((*subname).to_string())
            .or_insert_with(|| FsNode::Directory(Directory::new_implicit()));
        match subentry {
            FsNode::Directory(subdir) => {
                subdir.insert(entry, rest, &format!("{}/{}", location, subname))
            }
            _ => Err(PackageBuildError::NotADirectory(format!(
                "{}/{}",
                location, subname
            ))),
        }
    }

    /// Visits this directory and all nodes below it.
    ///
    /// The callback sees this directory first (at `base_path`), then all
    /// entries recursively in name-sorted order. Returning
    /// [WalkControl::SkipSubtree] from the callback skips the children of the
    /// visited directory; any error aborts the walk.
    pub fn walk<F>(&self, base_path: &str, callback: &mut F) -> Result<()>
    where
        F: FnMut(&str, NodeView<'_>) -> Result<WalkControl>,
    {
        match callback(base_path, NodeView::Directory(self))? {
            WalkControl::SkipSubtree => return Ok(()),
            WalkControl::Continue => {}
        }

        for (name, entry) in &self.entries {
            entry.walk(&join_walk_path(base_path, name), callback)?;
        }

        Ok(())
    }

    /// Approximates the apparent size of this directory and everything in it,
    /// as calculated by `du -s --apparent-size`, but in a
    /// filesystem-independent way.
    pub fn installed_size(&self) -> u64 {
        self.entries
            .values()
            .map(FsNode::installed_size)
            .sum::<u64>()
            + 4096
    }

    pub fn file_mode_for_archive(&self, including_file_type: bool) -> u32 {
        if including_file_type {
            0o40000 | (self.metadata.mode & 0o7777)
        } else {
            self.metadata.mode & 0o7777
        }
    }

    /// Generates a shell script applying all metadata in this tree that
    /// cannot be represented in an archive directly, and clears that metadata
    /// in place.
    ///
    /// Owners and groups identified by name cannot be resolved into numeric
    /// ids at build time, so each one becomes a `chown`/`chgrp` line operating
    /// on the node's install path. After this call, all remaining ownership in
    /// the tree is numeric.
    pub fn postpone_unmaterializable(&mut self, base_path: &str) -> String {
        let mut script = self.metadata.postpone_unmaterializable(base_path);

        for (name, entry) in &mut self.entries {
            let path = join_walk_path(base_path, name);
            match entry {
                FsNode::Directory(dir) => {
                    script.push_str(&dir.postpone_unmaterializable(&path));
                }
                FsNode::RegularFile(file) => {
                    script.push_str(&file.metadata.postpone_unmaterializable(&path));
                }
                FsNode::Symlink(_) => {}
            }
        }

        script
    }
}

/// A regular file node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegularFile {
    pub content: Vec<u8>,
    pub metadata: NodeMetadata,
}

impl RegularFile {
    pub fn new(content: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            content: content.into(),
            metadata: NodeMetadata::new(mode),
        }
    }

    /// Lowercase hex MD5 digest of this file's contents.
    pub fn md5_digest(&self) -> String {
        hex::encode(Md5::digest(&self.content))
    }

    /// Lowercase hex SHA-256 digest of this file's contents.
    pub fn sha256_digest(&self) -> String {
        hex::encode(Sha256::digest(&self.content))
    }

    pub fn file_mode_for_archive(&self, including_file_type: bool) -> u32 {
        if including_file_type {
            0o100000 | (self.metadata.mode & 0o7777)
        } else {
            self.metadata.mode & 0o7777
        }
    }
}

/// A symbolic link node.
///
/// Symlinks carry no metadata: their mode is fixed at 0777 and ownership is
/// always root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Symlink {
    pub target: String,
}

impl Symlink {
    pub fn file_mode_for_archive(&self, including_file_type: bool) -> u32 {
        if including_file_type {
            0o120777
        } else {
            0o777
        }
    }
}

/// An entry in the filesystem tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FsNode {
    Directory(Directory),
    RegularFile(RegularFile),
    Symlink(Symlink),
}

impl FsNode {
    /// Obtain a borrowed view for pattern matching during walks.
    pub fn view(&self) -> NodeView<'_> {
        match self {
            Self::Directory(dir) => NodeView::Directory(dir),
            Self::RegularFile(file) => NodeView::RegularFile(file),
            Self::Symlink(link) => NodeView::Symlink(link),
        }
    }

    pub fn installed_size(&self) -> u64 {
        match self {
            Self::Directory(dir) => dir.installed_size(),
            Self::RegularFile(file) => file.content.len() as u64,
            Self::Symlink(link) => link.target.len() as u64,
        }
    }

    /// The file mode of this node as stored in a tar or CPIO archive.
    pub fn file_mode_for_archive(&self, including_file_type: bool) -> u32 {
        match self {
            Self::Directory(dir) => dir.file_mode_for_archive(including_file_type),
            Self::RegularFile(file) => file.file_mode_for_archive(including_file_type),
            Self::Symlink(link) => link.file_mode_for_archive(including_file_type),
        }
    }

    fn walk<F>(&self, path: &str, callback: &mut F) -> Result<()>
    where
        F: FnMut(&str, NodeView<'_>) -> Result<WalkControl>,
    {
        match self {
            Self::Directory(dir) => dir.walk(path, callback),
            // SkipSubtree on a leaf is a no-op
            Self::RegularFile(_) | Self::Symlink(_) => {
                callback(path, self.view())?;
                Ok(())
            }
        }
    }
}

/// Borrowed view of an [FsNode], handed to walk callbacks.
#[derive(Clone, Copy, Debug)]
pub enum NodeView<'a> {
    Directory(&'a Directory),
    RegularFile(&'a RegularFile),
    Symlink(&'a Symlink),
}

impl<'a> NodeView<'a> {
    pub fn file_mode_for_archive(&self, including_file_type: bool) -> u32 {
        match self {
            Self::Directory(dir) => dir.file_mode_for_archive(including_file_type),
            Self::RegularFile(file) => file.file_mode_for_archive(including_file_type),
            Self::Symlink(link) => link.file_mode_for_archive(including_file_type),
        }
    }
}

/// Flow control returned by walk callbacks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WalkControl {
    /// Keep walking.
    Continue,
    /// Do not descend into the entries of the visited directory.
    SkipSubtree,
}

/// Composes the path for a walked entry from its parent's path.
fn join_walk_path(base_path: &str, name: &str) -> String {
    match base_path {
        "" => name.to_string(),
        "/" => format!("/{}", name),
        _ => format!("{}/{}", base_path, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(content: &str) -> FsNode {
        FsNode::RegularFile(RegularFile::new(content.as_bytes().to_vec(), 0o644))
    }

    fn collect_walk(root: &Directory, base: &str) -> Vec<String> {
        let mut paths = vec![];
        root.walk(base, &mut |path, _| {
            paths.push(path.to_string());
            Ok(WalkControl::Continue)
        })
        .unwrap();
        paths
    }

    #[test]
    fn test_insert_spawns_implicit_directories() {
        let mut root = Directory::new();
        root.insert(file("x"), &["etc", "foo", "bar.conf"], "/")
            .unwrap();

        let etc = match root.entries.get("etc").unwrap() {
            FsNode::Directory(dir) => dir,
            _ => panic!("expected directory"),
        };
        assert!(etc.implicit);
        assert_eq!(etc.metadata.mode, 0o755);
        let foo = match etc.entries.get("foo").unwrap() {
            FsNode::Directory(dir) => dir,
            _ => panic!("expected directory"),
        };
        assert!(foo.implicit);
        assert!(matches!(
            foo.entries.get("bar.conf").unwrap(),
            FsNode::RegularFile(_)
        ));
    }

    #[test]
    fn test_insert_explicit_directory_replaces_implicit() {
        let mut root = Directory::new();
        root.insert(file("x"), &["etc", "foo", "bar.conf"], "/")
            .unwrap();

        let mut declared = Directory::new();
        declared.metadata.mode = 0o700;
        root.insert(FsNode::Directory(declared), &["etc", "foo"], "/")
            .unwrap();

        let etc = match root.entries.get("etc").unwrap() {
            FsNode::Directory(dir) => dir,
            _ => panic!("expected directory"),
        };
        let foo = match etc.entries.get("foo").unwrap() {
            FsNode::Directory(dir) => dir,
            _ => panic!("expected directory"),
        };
        assert!(!foo.implicit);
        assert_eq!(foo.metadata.mode, 0o700);
        // the implicit directory's children were adopted
        assert!(foo.entries.contains_key("bar.conf"));
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let mut root = Directory::new();
        root.insert(file("a"), &["etc", "foo.conf"], "/").unwrap();
        assert!(matches!(
            root.insert(file("b"), &["etc", "foo.conf"], "/"),
            Err(PackageBuildError::DuplicateEntry)
        ));

        // a declared directory cannot be replaced either
        root.insert(FsNode::Directory(Directory::new()), &["srv"], "/")
            .unwrap();
        assert!(matches!(
            root.insert(FsNode::Directory(Directory::new()), &["srv"], "/"),
            Err(PackageBuildError::DuplicateEntry)
        ));
    }

    #[test]
    fn test_insert_through_file_fails() {
        let mut root = Directory::new();
        root.insert(file("a"), &["etc", "foo"], "/").unwrap();
        match root.insert(file("b"), &["etc", "foo", "bar"], "/") {
            Err(PackageBuildError::NotADirectory(path)) => {
                assert_eq!(path, "//etc/foo");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_walk_order_and_path_composition() {
        let mut root = Directory::new();
        root.insert(file("1"), &["etc", "zz.conf"], "/").unwrap();
        root.insert(file("2"), &["etc", "aa.conf"], "/").unwrap();
        root.insert(file("3"), &["bin", "tool"], "/").unwrap();

        assert_eq!(
            collect_walk(&root, "/"),
            vec!["/", "/bin", "/bin/tool", "/etc", "/etc/aa.conf", "/etc/zz.conf"]
        );
        assert_eq!(
            collect_walk(&root, ""),
            vec!["", "bin", "bin/tool", "etc", "etc/aa.conf", "etc/zz.conf"]
        );
    }

    #[test]
    fn test_walk_skip_subtree() {
        let mut root = Directory::new();
        root.insert(file("1"), &["etc", "foo.conf"], "/").unwrap();
        root.insert(file("2"), &["usr", "bin", "tool"], "/").unwrap();

        let mut paths = vec![];
        root.walk("/", &mut |path, _| {
            paths.push(path.to_string());
            if path == "/etc" {
                Ok(WalkControl::SkipSubtree)
            } else {
                Ok(WalkControl::Continue)
            }
        })
        .unwrap();

        assert_eq!(paths, vec!["/", "/etc", "/usr", "/usr/bin", "/usr/bin/tool"]);
    }

    #[test]
    fn test_installed_size() {
        let mut root = Directory::new();
        root.insert(file("hello"), &["etc", "motd"], "/").unwrap();
        root.insert(
            FsNode::Symlink(Symlink {
                target: "motd".to_string(),
            }),
            &["etc", "motd2"],
            "/",
        )
        .unwrap();

        // root + implicit /etc + 5 content bytes + 4 target bytes
        assert_eq!(root.installed_size(), 4096 + 4096 + 5 + 4);
    }

    #[test]
    fn test_file_modes_for_archive() {
        let dir = Directory::new();
        assert_eq!(dir.file_mode_for_archive(true), 0o40755);
        assert_eq!(dir.file_mode_for_archive(false), 0o755);

        let file = RegularFile::new(vec![], 0o4755);
        assert_eq!(file.file_mode_for_archive(true), 0o104755);

        let link = Symlink {
            target: "/dev/null".to_string(),
        };
        assert_eq!(link.file_mode_for_archive(true), 0o120777);
        assert_eq!(link.file_mode_for_archive(false), 0o777);
    }

    #[test]
    fn test_postpone_unmaterializable() {
        let mut root = Directory::new();
        let mut conf = RegularFile::new(b"x".to_vec(), 0o640);
        conf.metadata.owner = Some(IdOrName::Name("http".to_string()));
        conf.metadata.group = Some(IdOrName::Name("http".to_string()));
        root.insert(FsNode::RegularFile(conf), &["etc", "app.conf"], "/")
            .unwrap();

        let mut spool = Directory::new();
        spool.metadata.group = Some(IdOrName::Name("mail".to_string()));
        root.insert(FsNode::Directory(spool), &["var", "spool"], "/")
            .unwrap();

        let mut log = RegularFile::new(vec![], 0o644);
        log.metadata.owner = Some(IdOrName::Id(37));
        root.insert(FsNode::RegularFile(log), &["var", "log"], "/")
            .unwrap();

        let script = root.postpone_unmaterializable("/");
        assert_eq!(
            script,
            "chown http:http /etc/app.conf\nchgrp mail /var/spool\n"
        );

        // numeric ownership stays in the tree, names are gone
        let second = root.postpone_unmaterializable("/");
        assert_eq!(second, "");
        root.walk("/", &mut |path, node| {
            if let NodeView::RegularFile(file) = node {
                if path == "/var/log" {
                    assert_eq!(file.metadata.uid(), 37);
                }
                assert!(!matches!(file.metadata.owner, Some(IdOrName::Name(_))));
                assert!(!matches!(file.metadata.group, Some(IdOrName::Name(_))));
            }
            Ok(WalkControl::Continue)
        })
        .unwrap();
    }

    #[test]
    fn test_digests() {
        let file = RegularFile::new(b"x\n".to_vec(), 0o644);
        assert_eq!(file.md5_digest(), "401b30e3b8b5d629635a5c613cdb7919");
        assert_eq!(
            file.sha256_digest(),
            "73cb3858a687a8494ca3323053016282f3dad39d42cf62ca4e79dda2aac7d9ac"
        );
    }
}
