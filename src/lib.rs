// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build Linux system packages from a declarative description.

This crate compiles a distribution-neutral, in-memory package description
into a binary package file for one of the supported package managers:

- dpkg (`.deb`, used by Debian and Ubuntu), see [debian]
- pacman (`.pkg.tar.xz`, used by Arch Linux), see [pacman]
- RPM (`.rpm`, used by Fedora, openSUSE, Mageia and others), see [rpm]

The core types are [Package] — the description of the package to build,
including its [filesystem tree](filesystem) — and [Generator], the interface
every format back-end implements. [build::build_package] runs the whole
pipeline and [build::write_output] writes the result without rewriting files
whose content would not change.

All back-ends build reproducibly: the same input yields bit-identical output
across runs and machines. Archive timestamps are pinned to the UNIX epoch and
nothing is read from the clock, the environment, or random sources.
*/

pub mod build;
pub mod debian;
pub mod error;
pub mod filesystem;
pub mod generator;
pub mod pacman;
pub mod package;
pub mod report;
pub mod rpm;
pub mod validation;

pub use crate::{
    build::{build_package, write_output, BuildFailure, OutputDisposition, OutputTarget},
    error::{PackageBuildError, Result},
    generator::{Generator, PackageFormat},
    package::{
        ActionKind, Architecture, Package, PackageAction, PackageRelation, Prerelease,
        VersionConstraint,
    },
};
