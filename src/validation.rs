// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Regex-driven validation of packages.

Every back-end supplies a [RegexSet] describing the name and version formats
its package manager accepts; [Package::validate_with] runs the checks that are
common to all formats against it. Validation never short-circuits: all errors
are collected so the caller can display them at once.
*/

use {
    crate::{
        error::PackageBuildError,
        package::{Architecture, Package, PackageRelation, Prerelease},
    },
    once_cell::sync::Lazy,
    regex::Regex,
};

/// Version format accepted at the model layer: a chain of dot-separated
/// numbers without leading zeroes. Back-ends may tighten this further.
static VERSION_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0|[1-9][0-9]*)(?:\.(?:0|[1-9][0-9]*))*$").unwrap());

static AUTHOR_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^<>]+\s+<[^<>\s]+>$").unwrap());

/// Accumulates errors for collective display.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    pub errors: Vec<PackageBuildError>,
}

impl ErrorCollector {
    pub fn add(&mut self, error: PackageBuildError) {
        self.errors.push(error);
    }

    pub fn addf(&mut self, message: impl Into<String>) {
        self.errors.push(PackageBuildError::Validation(message.into()));
    }

    pub fn into_errors(self) -> Vec<PackageBuildError> {
        self.errors
    }
}

/// A collection of regular expressions for validating a package, supplied by
/// a back-end. The patterns are implicitly anchored.
pub struct RegexSet {
    pub package_name: &'static str,
    pub package_version: &'static str,
    pub related_name: &'static str,
    pub related_version: &'static str,
    /// Used for error messages only.
    pub format_name: &'static str,
}

/// A [RegexSet] with its patterns compiled.
pub struct CompiledRegexSet {
    package_name: Regex,
    package_version: Regex,
    related_name: Regex,
    related_version: Regex,
    format_name: &'static str,
}

impl RegexSet {
    /// Compiles the patterns. The patterns are back-end constants, so failure
    /// to compile is a programming error.
    pub fn compile(&self) -> CompiledRegexSet {
        let anchored =
            |pattern: &str| Regex::new(&format!("^(?:{})$", pattern)).expect("invalid regex");

        CompiledRegexSet {
            package_name: anchored(self.package_name),
            package_version: anchored(self.package_version),
            related_name: anchored(self.related_name),
            related_version: anchored(self.related_version),
            format_name: self.format_name,
        }
    }
}

impl Package {
    /// Validates the package name, version, release, architecture and related
    /// packages against the given regex set and architecture map. Returns all
    /// failures; an empty list means the package passed.
    pub fn validate_with(
        &self,
        regexes: &CompiledRegexSet,
        arch_map: &[(Architecture, &'static str)],
    ) -> Vec<PackageBuildError> {
        let mut ec = ErrorCollector::default();

        // if name or version is empty, the input layer already rejected it
        // and we don't need to complain about it again
        if !self.name.is_empty() && !regexes.package_name.is_match(&self.name) {
            ec.addf(format!(
                "Package name \"{}\" is not acceptable for {} packages",
                self.name, regexes.format_name
            ));
        }
        if !self.version.is_empty() && !regexes.package_version.is_match(&self.version) {
            ec.addf(format!(
                "Package version \"{}\" is not acceptable for {} packages",
                self.version, regexes.format_name
            ));
        }

        if self.release == 0 {
            ec.addf("Package release may not be zero (numbering of releases starts at 1)");
        }

        if crate::package::lookup_architecture(arch_map, self.architecture).is_none() {
            ec.addf(format!(
                "Architecture \"{}\" is not acceptable for {} packages",
                self.architecture, regexes.format_name
            ));
        }

        validate_relations(regexes, "requires", &self.requires, &mut ec);
        validate_relations(regexes, "provides", &self.provides, &mut ec);
        validate_relations(regexes, "conflicts", &self.conflicts, &mut ec);
        validate_relations(regexes, "replaces", &self.replaces, &mut ec);

        ec.into_errors()
    }

    /// Validates the invariants that hold regardless of the target format:
    /// the model-layer version shape, the description and author formats, and
    /// prerelease counter consistency.
    pub fn validate_definition(&self) -> Vec<PackageBuildError> {
        let mut ec = ErrorCollector::default();

        if !self.version.is_empty() && !VERSION_RX.is_match(&self.version) {
            ec.addf(format!(
                "Invalid package version \"{}\" (must be a chain of numbers like \"1.2.0\" or \"20151104\")",
                self.version
            ));
        }

        if self.description.contains('\n') || self.description.contains('\r') {
            ec.addf(format!(
                "Invalid package description \"{}\" (may not contain newlines)",
                self.description
            ));
        }

        if !self.author.is_empty() && !AUTHOR_RX.is_match(&self.author) {
            ec.addf(format!(
                "Invalid package author \"{}\" (should look like \"Jane Doe <jane.doe@example.org>\")",
                self.author
            ));
        }

        if matches!(self.prerelease, Prerelease::Alpha(0) | Prerelease::Beta(0)) {
            ec.addf("Prerelease counter may not be zero (numbering of prereleases starts at 1)");
        }

        ec.into_errors()
    }
}

fn validate_relations(
    regexes: &CompiledRegexSet,
    relation_kind: &str,
    relations: &[PackageRelation],
    ec: &mut ErrorCollector,
) {
    for relation in relations {
        if !regexes.related_name.is_match(&relation.related_package) {
            ec.addf(format!(
                "Package name \"{}\" is not acceptable for {} packages (found in {})",
                relation.related_package, regexes.format_name, relation_kind
            ));
        }
        for constraint in &relation.constraints {
            if !regexes.related_version.is_match(&constraint.version) {
                ec.addf(format!(
                    "Version in \"{} {} {}\" is not acceptable for {} packages (found in {})",
                    relation.related_package,
                    constraint.relation,
                    constraint.version,
                    regexes.format_name,
                    relation_kind
                ));
            }
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::I386 => "i386",
            Self::X86_64 => "x86_64",
            Self::ARMv5 => "armv5",
            Self::ARMv6h => "armv6h",
            Self::ARMv7h => "armv7h",
            Self::AArch64 => "aarch64",
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::package::VersionConstraint};

    fn sample_regexes() -> CompiledRegexSet {
        RegexSet {
            package_name: "[a-z0-9-]+",
            package_version: "[0-9.]+",
            related_name: "[a-z0-9-]+",
            related_version: "[0-9.]+",
            format_name: "sample",
        }
        .compile()
    }

    #[test]
    fn test_validate_with_accepts_good_package() {
        let mut pkg = Package::new("good-package", "1.2.3");
        pkg.requires = vec![PackageRelation::new("other")];

        let errors = pkg.validate_with(&sample_regexes(), &[(Architecture::Any, "any")]);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_validate_with_collects_all_errors() {
        let mut pkg = Package::new("Bad_Name", "1.0");
        pkg.release = 0;
        pkg.architecture = Architecture::ARMv6h;
        pkg.requires = vec![PackageRelation {
            related_package: "ok-name".to_string(),
            constraints: vec![VersionConstraint::new(">=", "not_a_version")],
        }];

        let errors = pkg.validate_with(&sample_regexes(), &[(Architecture::Any, "any")]);
        let messages = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>();

        assert_eq!(messages.len(), 4, "messages: {:?}", messages);
        assert!(messages[0].contains("Package name \"Bad_Name\""));
        assert!(messages[1].contains("release may not be zero"));
        assert!(messages[2].contains("Architecture \"armv6h\""));
        assert!(messages[3].contains("found in requires"));
    }

    #[test]
    fn test_validate_with_skips_empty_name_and_version() {
        let pkg = Package::new("", "");
        let errors = pkg.validate_with(&sample_regexes(), &[(Architecture::Any, "any")]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_validate_definition() {
        let mut pkg = Package::new("pkg", "1.2.3");
        assert!(pkg.validate_definition().is_empty());

        pkg.version = "1.02".to_string();
        pkg.description = "two\nlines".to_string();
        pkg.author = "no address".to_string();
        pkg.prerelease = Prerelease::Alpha(0);

        let errors = pkg.validate_definition();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].to_string().contains("chain of numbers"));
        assert!(errors[1].to_string().contains("newlines"));
        assert!(errors[2].to_string().contains("package author"));
        assert!(errors[3].to_string().contains("Prerelease counter"));
    }
}
