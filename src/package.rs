// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The distribution-neutral package model.

A [Package] holds everything a back-end needs to produce a binary package:
identity, version information, relations to other packages, install-time
actions, and the filesystem tree of delivered entries. It is populated once by
the caller (typically from a parsed package description), preprocessed by the
build orchestrator, and then serialized by a single back-end.
*/

use crate::{
    error::{PackageBuildError, Result},
    filesystem::{Directory, FsNode, NodeView, WalkControl},
};

/// Target architecture of a package.
///
/// `Any` is for packages without compiled binaries and is the default. Each
/// back-end maps these values to its own canonical strings; an architecture a
/// back-end has no mapping for fails that back-end's validation.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Architecture {
    Any,
    I386,
    X86_64,
    ARMv5,
    ARMv6h,
    ARMv7h,
    AArch64,
}

impl Default for Architecture {
    fn default() -> Self {
        Self::Any
    }
}

/// Looks up an architecture in a back-end's architecture map.
pub(crate) fn lookup_architecture(
    map: &[(Architecture, &'static str)],
    arch: Architecture,
) -> Option<&'static str> {
    map.iter()
        .find(|(candidate, _)| *candidate == arch)
        .map(|(_, name)| *name)
}

/// Prerelease state of a package version.
///
/// The counter inside `Alpha`/`Beta` numbers consecutive prereleases and must
/// not be zero. Back-ends encode the prerelease into the full version string
/// so that prerelease packages order before the final release.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Prerelease {
    None,
    Alpha(u32),
    Beta(u32),
}

impl Default for Prerelease {
    fn default() -> Self {
        Self::None
    }
}

impl Prerelease {
    /// The prerelease type name and counter, or `None` for a final release.
    pub fn parts(&self) -> Option<(&'static str, u32)> {
        match self {
            Self::None => None,
            Self::Alpha(counter) => Some(("alpha", *counter)),
            Self::Beta(counter) => Some(("beta", *counter)),
        }
    }
}

/// A relation to another package, with any number of version constraints.
///
/// For example, requiring any version of `foo` and at least version 2.1.2
/// (but less than 3.0) of `bar`:
///
/// ```
/// use linux_package_builder::{PackageRelation, VersionConstraint};
///
/// let requires = vec![
///     PackageRelation::new("foo"),
///     PackageRelation {
///         related_package: "bar".to_string(),
///         constraints: vec![
///             VersionConstraint::new(">=", "2.1.2"),
///             VersionConstraint::new("<", "3.0"),
///         ],
///     },
/// ];
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageRelation {
    pub related_package: String,
    pub constraints: Vec<VersionConstraint>,
}

impl PackageRelation {
    /// A relation without version constraints.
    pub fn new(related_package: impl Into<String>) -> Self {
        Self {
            related_package: related_package.into(),
            constraints: vec![],
        }
    }
}

/// A version constraint inside a [PackageRelation].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionConstraint {
    /// One of `<`, `<=`, `=`, `>=`, `>`.
    pub relation: String,
    /// The version on the right side of the relation. Not structured further
    /// at this level since the acceptable format depends on the back-end.
    pub version: String,
}

impl VersionConstraint {
    pub fn new(relation: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            version: version.into(),
        }
    }
}

/// When an action's script runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActionKind {
    /// Runs immediately after the package has been installed or upgraded.
    Setup,
    /// Runs immediately after the package has been removed.
    Cleanup,
}

/// A shell script executed by the package manager at a point in its lifecycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageAction {
    pub kind: ActionKind,
    pub content: String,
}

impl PackageAction {
    pub fn new(kind: ActionKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// All information about a single package. This representation is passed into
/// the back-ends.
#[derive(Clone, Debug)]
pub struct Package {
    /// The package name.
    pub name: String,
    /// The version of the package contents, a chain of dot-separated numbers
    /// like `1.2.0` or `20151104`.
    pub version: String,
    /// Prerelease state of `version`.
    pub prerelease: Prerelease,
    /// A counter that can be increased when the same version of one package
    /// needs to be rebuilt. The default value is 1.
    pub release: u32,
    /// A counter that can be increased when the version of a newer package is
    /// smaller than the previous version, thus breaking normal version
    /// comparison logic. The default value is 0, which usually results in the
    /// epoch not being shown in the combined version string at all.
    pub epoch: u32,
    /// The optional package description.
    pub description: String,
    /// The package author's name and mail address in the form
    /// `Firstname Lastname <email.address@server.tld>`, if available.
    pub author: String,
    /// The target architecture of this package.
    pub architecture: Architecture,
    /// Packages that must be installed together with this package. Called
    /// "Depends" by some package managers.
    pub requires: Vec<PackageRelation>,
    /// Packages (or virtual packages) whose features this package provides.
    pub provides: Vec<PackageRelation>,
    /// Packages that cannot be installed at the same time as this package.
    pub conflicts: Vec<PackageRelation>,
    /// Obsolete packages that are replaced by this package on upgrade.
    pub replaces: Vec<PackageRelation>,
    /// Actions executed while the package manager runs.
    pub actions: Vec<PackageAction>,
    /// The root directory of the package's file system, containing all other
    /// files and directories recursively.
    pub fs_root: Directory,
}

impl Package {
    /// Creates a package with the given name and version and all other fields
    /// at their defaults.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let mut fs_root = Directory::new();
        fs_root.implicit = true;

        Self {
            name: name.into(),
            version: version.into(),
            prerelease: Prerelease::None,
            release: 1,
            epoch: 0,
            description: String::new(),
            author: String::new(),
            architecture: Architecture::Any,
            requires: vec![],
            provides: vec![],
            conflicts: vec![],
            replaces: vec![],
            actions: vec![],
            fs_root,
        }
    }

    /// Executes common preparation steps. Each back-end's build entry point
    /// calls this before serializing anything.
    pub fn prepare_build(&mut self) {
        let script = self.fs_root.postpone_unmaterializable("/");
        if !script.is_empty() {
            let script = script.trim_end_matches('\n').to_string();
            self.prepend_actions([PackageAction::new(ActionKind::Setup, script)]);
        }
    }

    /// Prepends actions to the action list, preserving their order.
    pub fn prepend_actions(&mut self, actions: impl IntoIterator<Item = PackageAction>) {
        let mut combined = actions.into_iter().collect::<Vec<_>>();
        combined.append(&mut self.actions);
        self.actions = combined;
    }

    /// Appends actions to the action list.
    pub fn append_actions(&mut self, actions: impl IntoIterator<Item = PackageAction>) {
        self.actions.extend(actions);
    }

    /// The concatenation of the scripts for all actions of the given kind,
    /// joined with newlines and trimmed.
    pub fn script(&self, kind: ActionKind) -> String {
        let scripts = self
            .actions
            .iter()
            .filter(|action| action.kind == kind)
            .map(|action| action.content.as_str())
            .collect::<Vec<_>>();

        scripts.join("\n").trim().to_string()
    }

    /// Inserts a filesystem node at the given absolute path.
    ///
    /// The path must start with `/` and must not end with `/`. The only
    /// exception is the path `/` itself, which replaces an implicit root
    /// directory with a declared one while preserving its entries.
    pub fn insert_fs_node(&mut self, absolute_path: &str, node: FsNode) -> Result<()> {
        let wrap = |error: PackageBuildError| {
            PackageBuildError::FilesystemInsert(absolute_path.to_string(), Box::new(error))
        };

        if absolute_path == "/" {
            return match node {
                FsNode::Directory(mut dir) if self.fs_root.implicit => {
                    dir.entries.append(&mut self.fs_root.entries);
                    self.fs_root = dir;
                    Ok(())
                }
                _ => Err(wrap(PackageBuildError::DuplicateEntry)),
            };
        }

        let rel_path = match absolute_path.strip_prefix('/') {
            Some(rel) if !rel.is_empty() && !rel.ends_with('/') => rel,
            _ => {
                return Err(wrap(PackageBuildError::Validation(format!(
                    "\"{}\" is not an acceptable absolute path",
                    absolute_path
                ))))
            }
        };
        let segments = rel_path.split('/').collect::<Vec<_>>();

        self.fs_root.insert(node, &segments, "/").map_err(wrap)
    }

    /// Walks the filesystem tree, yielding absolute paths (with a leading
    /// slash). The root directory is visited as `/`.
    pub fn walk_fs_absolute<F>(&self, callback: &mut F) -> Result<()>
    where
        F: FnMut(&str, NodeView<'_>) -> Result<WalkControl>,
    {
        self.fs_root.walk("/", callback)
    }

    /// Walks the filesystem tree, yielding paths relative to the root
    /// (without a leading slash). The root directory is visited as `""`.
    pub fn walk_fs_relative<F>(&self, callback: &mut F) -> Result<()>
    where
        F: FnMut(&str, NodeView<'_>) -> Result<WalkControl>,
    {
        self.fs_root.walk("", callback)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::filesystem::{IdOrName, RegularFile},
    };

    #[test]
    fn test_script_concatenation() {
        let mut pkg = Package::new("scripted", "1.0");
        pkg.append_actions([
            PackageAction::new(ActionKind::Setup, "echo one"),
            PackageAction::new(ActionKind::Cleanup, "echo bye"),
            PackageAction::new(ActionKind::Setup, "echo two\n"),
        ]);

        assert_eq!(pkg.script(ActionKind::Setup), "echo one\necho two");
        assert_eq!(pkg.script(ActionKind::Cleanup), "echo bye");

        let empty = Package::new("empty", "1.0");
        assert_eq!(empty.script(ActionKind::Setup), "");
    }

    #[test]
    fn test_prepare_build_prepends_chown_script() {
        let mut pkg = Package::new("owned", "1.0");
        let mut file = RegularFile::new(b"x".to_vec(), 0o644);
        file.metadata.owner = Some(IdOrName::Name("http".to_string()));
        pkg.insert_fs_node("/etc/app.conf", FsNode::RegularFile(file))
            .unwrap();
        pkg.append_actions([PackageAction::new(ActionKind::Setup, "echo hi")]);

        pkg.prepare_build();

        assert_eq!(
            pkg.script(ActionKind::Setup),
            "chown http /etc/app.conf\necho hi"
        );

        // a second preparation is a no-op
        pkg.prepare_build();
        assert_eq!(
            pkg.script(ActionKind::Setup),
            "chown http /etc/app.conf\necho hi"
        );
    }

    #[test]
    fn test_insert_fs_node_wraps_errors() {
        let mut pkg = Package::new("pkg", "1.0");
        pkg.insert_fs_node(
            "/etc/foo",
            FsNode::RegularFile(RegularFile::new(vec![], 0o644)),
        )
        .unwrap();

        let err = pkg
            .insert_fs_node(
                "/etc/foo",
                FsNode::RegularFile(RegularFile::new(vec![], 0o644)),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to insert \"/etc/foo\" into the package file system: duplicate entry"
        );
    }

    #[test]
    fn test_insert_fs_node_path_rules() {
        let mut pkg = Package::new("pkg", "1.0");
        let node = || FsNode::RegularFile(RegularFile::new(vec![], 0o644));

        assert!(pkg.insert_fs_node("etc/foo", node()).is_err());
        assert!(pkg.insert_fs_node("/etc/foo/", node()).is_err());
        assert!(pkg.insert_fs_node("/etc/foo", node()).is_ok());
    }

    #[test]
    fn test_declared_root_replaces_implicit_root() {
        let mut pkg = Package::new("rooted", "1.0");
        pkg.insert_fs_node(
            "/etc/foo",
            FsNode::RegularFile(RegularFile::new(vec![], 0o644)),
        )
        .unwrap();

        let mut declared = Directory::new();
        declared.metadata.mode = 0o711;
        pkg.insert_fs_node("/", FsNode::Directory(declared)).unwrap();

        assert!(!pkg.fs_root.implicit);
        assert_eq!(pkg.fs_root.metadata.mode, 0o711);
        assert!(pkg.fs_root.entries.contains_key("etc"));

        // the root is now declared, so a second declaration is a duplicate
        let result = pkg.insert_fs_node("/", FsNode::Directory(Directory::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_walk_wrappers() {
        let mut pkg = Package::new("pkg", "1.0");
        pkg.insert_fs_node(
            "/usr/bin/tool",
            FsNode::RegularFile(RegularFile::new(vec![], 0o755)),
        )
        .unwrap();

        let mut absolute = vec![];
        pkg.walk_fs_absolute(&mut |path, _| {
            absolute.push(path.to_string());
            Ok(WalkControl::Continue)
        })
        .unwrap();
        assert_eq!(absolute, vec!["/", "/usr", "/usr/bin", "/usr/bin/tool"]);

        let mut relative = vec![];
        pkg.walk_fs_relative(&mut |path, _| {
            relative.push(path.to_string());
            Ok(WalkControl::Continue)
        })
        .unwrap();
        assert_eq!(relative, vec!["", "usr", "usr/bin", "usr/bin/tool"]);
    }
}
