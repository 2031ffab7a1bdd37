// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build orchestration.

Ties the pieces together: pre-build transforms on the package, validation
dispatch, back-end dispatch, and writing the produced bytes to their
destination without touching files whose content would not change.
*/

use {
    crate::{
        error::{PackageBuildError, Result},
        filesystem::WalkControl,
        generator::Generator,
        package::{ActionKind, Package, PackageAction, PackageRelation},
    },
    std::{
        collections::BTreeSet,
        io::Write,
        path::{Path, PathBuf},
    },
};

/// Why a build did not produce a package.
#[derive(Debug, thiserror::Error)]
pub enum BuildFailure {
    /// The package failed validation. All collected errors are included so
    /// they can be displayed together.
    #[error("package failed validation")]
    Invalid(Vec<PackageBuildError>),

    /// Building or writing the package failed.
    #[error("{0}")]
    Build(#[from] PackageBuildError),
}

impl BuildFailure {
    /// The process exit code the command line wrapper reports for this
    /// failure: 1 for input and validation problems, 2 for build and write
    /// problems.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Invalid(_) => 1,
            Self::Build(_) => 2,
        }
    }
}

/// Makes the implicit `holo apply` actions and the implicit `holo-$PLUGIN`
/// dependencies explicit.
///
/// Every filesystem entry strictly below `/usr/share/holo/<plugin>` marks the
/// package as provisioned by that configuration management plugin: the plugin
/// package becomes a requirement (unless already declared), and `holo apply`
/// runs on setup and cleanup.
pub fn holo_integration(pkg: &mut Package) -> Result<()> {
    let mut plugin_ids = BTreeSet::new();
    pkg.walk_fs_absolute(&mut |path, _| {
        if let Some(rest) = path.strip_prefix("/usr/share/holo/") {
            let mut parts = rest.split('/');
            // only paths strictly below /usr/share/holo/<plugin> count
            if let (Some(plugin_id), Some(_)) = (parts.next(), parts.next()) {
                plugin_ids.insert(plugin_id.to_string());
            }
        }
        Ok(WalkControl::Continue)
    })?;

    if plugin_ids.is_empty() {
        return Ok(());
    }

    for plugin_id in &plugin_ids {
        let dependency = format!("holo-{}", plugin_id);
        let already_declared = pkg
            .requires
            .iter()
            .any(|relation| relation.related_package == dependency);
        if !already_declared {
            pkg.requires.push(PackageRelation::new(dependency));
        }
    }

    pkg.prepend_actions([
        PackageAction::new(ActionKind::Setup, "holo apply"),
        PackageAction::new(ActionKind::Cleanup, "holo apply"),
    ]);

    Ok(())
}

/// Runs the full pipeline on a package: pre-build transforms, validation, and
/// the back-end build. Returns the bytes of the final package file.
pub fn build_package(
    pkg: &mut Package,
    generator: &dyn Generator,
) -> std::result::Result<Vec<u8>, BuildFailure> {
    holo_integration(pkg).map_err(BuildFailure::Build)?;

    let mut errors = pkg.validate_definition();
    errors.extend(generator.validate(pkg));
    if !errors.is_empty() {
        return Err(BuildFailure::Invalid(errors));
    }

    generator.build(pkg).map_err(BuildFailure::Build)
}

/// Where to write a built package.
#[derive(Clone, Copy, Debug)]
pub enum OutputTarget<'a> {
    /// Write the bytes to standard output.
    Stdout,
    /// Write to the given file, or into the given directory under the
    /// back-end's recommended file name.
    Path(&'a Path),
}

/// What [write_output] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputDisposition {
    /// The bytes were written.
    Written,
    /// The destination already contained exactly these bytes and was left
    /// untouched, preserving its timestamps.
    Unchanged,
}

/// Writes a built package to its destination.
///
/// Unless `force` is set, an existing destination file is never overwritten:
/// if its content equals `bytes` the write is skipped, otherwise the call
/// fails. Concurrent writers of the same path are not synchronized; callers
/// that care use distinct output paths.
pub fn write_output(
    bytes: &[u8],
    target: OutputTarget<'_>,
    recommended_file_name: &str,
    force: bool,
) -> Result<OutputDisposition> {
    let path: PathBuf = match target {
        OutputTarget::Stdout => {
            std::io::stdout().write_all(bytes)?;
            return Ok(OutputDisposition::Written);
        }
        OutputTarget::Path(path) => {
            if path.is_dir() {
                path.join(recommended_file_name)
            } else {
                path.to_path_buf()
            }
        }
    };

    // only write the file if its content would change
    if !force {
        match std::fs::read(&path) {
            Ok(existing) => {
                return if existing == bytes {
                    Ok(OutputDisposition::Unchanged)
                } else {
                    Err(PackageBuildError::OutputConflict)
                };
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o666);
    }
    let mut file = options.open(&path)?;
    file.write_all(bytes)?;

    Ok(OutputDisposition::Written)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            debian::DebianGenerator,
            filesystem::{FsNode, RegularFile},
        },
    };

    fn file_node() -> FsNode {
        FsNode::RegularFile(RegularFile::new(b"x".to_vec(), 0o644))
    }

    #[test]
    fn test_holo_integration() -> Result<()> {
        let mut pkg = Package::new("provisioned", "1.0");
        pkg.insert_fs_node("/usr/share/holo/foo/etc/a.conf", file_node())?;
        pkg.insert_fs_node("/usr/share/holo/bar/etc/b.conf", file_node())?;
        // an entry at (not below) a plugin directory does not count
        pkg.insert_fs_node("/usr/share/holo/baz", file_node())?;
        pkg.requires.push(PackageRelation::new("holo-foo"));
        pkg.append_actions([PackageAction::new(ActionKind::Setup, "echo custom")]);

        holo_integration(&mut pkg)?;

        let requirement_names = pkg
            .requires
            .iter()
            .map(|relation| relation.related_package.as_str())
            .collect::<Vec<_>>();
        assert_eq!(requirement_names, vec!["holo-foo", "holo-bar"]);

        assert_eq!(pkg.actions.len(), 3);
        assert_eq!(pkg.actions[0].kind, ActionKind::Setup);
        assert_eq!(pkg.actions[0].content, "holo apply");
        assert_eq!(pkg.actions[1].kind, ActionKind::Cleanup);
        assert_eq!(pkg.actions[1].content, "holo apply");
        assert_eq!(pkg.script(ActionKind::Setup), "holo apply\necho custom");

        Ok(())
    }

    #[test]
    fn test_holo_integration_without_plugin_files() -> Result<()> {
        let mut pkg = Package::new("plain", "1.0");
        pkg.insert_fs_node("/etc/plain.conf", file_node())?;

        holo_integration(&mut pkg)?;

        assert!(pkg.requires.is_empty());
        assert!(pkg.actions.is_empty());

        Ok(())
    }

    #[test]
    fn test_build_package_collects_validation_errors() {
        let mut pkg = Package::new("Bad_Name", "1.0");
        // no author either, so Debian validation reports two errors
        let failure = build_package(&mut pkg, &DebianGenerator).unwrap_err();

        match &failure {
            BuildFailure::Invalid(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected failure: {:?}", other),
        }
        assert_eq!(failure.exit_code(), 1);
    }

    #[test]
    fn test_build_package_success() {
        let mut pkg = Package::new("fine", "1.0");
        pkg.author = "A <a@b>".to_string();

        let bytes = build_package(&mut pkg, &DebianGenerator).unwrap();
        assert_eq!(&bytes[0..8], b"!<arch>\n");
    }

    #[test]
    fn test_write_output_idempotence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pkg.deb");

        let first = write_output(b"bytes", OutputTarget::Path(&path), "x.deb", false)?;
        assert_eq!(first, OutputDisposition::Written);

        // rewriting identical content leaves the file alone
        let mtime_before = std::fs::metadata(&path)?.modified()?;
        let second = write_output(b"bytes", OutputTarget::Path(&path), "x.deb", false)?;
        assert_eq!(second, OutputDisposition::Unchanged);
        assert_eq!(std::fs::metadata(&path)?.modified()?, mtime_before);

        // differing content is refused without force
        let conflict = write_output(b"other", OutputTarget::Path(&path), "x.deb", false);
        assert!(matches!(conflict, Err(PackageBuildError::OutputConflict)));

        // force overwrites
        let forced = write_output(b"other", OutputTarget::Path(&path), "x.deb", true)?;
        assert_eq!(forced, OutputDisposition::Written);
        assert_eq!(std::fs::read(&path)?, b"other");

        Ok(())
    }

    #[test]
    fn test_write_output_into_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;

        write_output(
            b"bytes",
            OutputTarget::Path(dir.path()),
            "pkg_1.0-1_all.deb",
            false,
        )?;

        assert_eq!(std::fs::read(dir.path().join("pkg_1.0-1_all.deb"))?, b"bytes");

        Ok(())
    }
}
