// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The interface implemented by every package format back-end. */

use crate::{
    error::{PackageBuildError, Result},
    package::Package,
};

/// A package format back-end.
///
/// One implementation exists for every supported target format. Back-ends are
/// stateless apart from their configuration; the package travels through
/// `validate` and `build` by reference.
pub trait Generator {
    /// Performs the validations that are specific to this package format, for
    /// example restrictions on the format of names and versions. Returns an
    /// empty list if the package is valid.
    fn validate(&self, pkg: &Package) -> Vec<PackageBuildError>;

    /// Produces the final package as a byte buffer.
    ///
    /// The package must be built reproducibly, such that every run (even
    /// across systems) produces an identical result. No timestamps or tool
    /// version information may be included.
    ///
    /// Implementations call [Package::prepare_build] before serializing
    /// anything, and may insert metadata files into the package's filesystem
    /// tree, which is why the package is taken mutably.
    fn build(&self, pkg: &mut Package) -> Result<Vec<u8>>;

    /// The recommended file name for the built package, following the
    /// distribution's naming conventions. Never contains slashes.
    fn recommended_file_name(&self, pkg: &Package) -> String;
}

/// The package formats this crate can produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageFormat {
    Debian,
    Pacman,
    Rpm,
}

impl PackageFormat {
    /// Obtain the back-end for this format.
    ///
    /// The pacman back-end is constructed with the production group resolver;
    /// use [crate::pacman::PacmanGenerator::new] directly to override it.
    pub fn generator(&self) -> Box<dyn Generator> {
        match self {
            Self::Debian => Box::new(crate::debian::DebianGenerator),
            Self::Pacman => Box::new(crate::pacman::PacmanGenerator::new(
                crate::pacman::GroupResolver::Pacman,
            )),
            Self::Rpm => Box::new(crate::rpm::RpmGenerator),
        }
    }
}
