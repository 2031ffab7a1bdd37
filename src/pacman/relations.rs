// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rendering of package relations into `.PKGINFO` lines.

The requirements list additionally understands two prefixes on related
package names: `group:` expands the name through the distribution's package
group database, and `except:` removes the named package (or group) from the
resolved set again.
*/

use {
    crate::{
        error::{PackageBuildError, Result},
        package::PackageRelation,
    },
    std::collections::BTreeMap,
};

/// Resolves a package group name into its member packages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupResolver {
    /// Splits the group name on dashes, e.g. `foo-bar-baz` contains the
    /// packages `foo`, `bar` and `baz`. Used by unit tests.
    Mock,
    /// Queries the group database via `pacman -Sqg`.
    Pacman,
}

impl GroupResolver {
    pub fn resolve(&self, group_name: &str) -> Result<Vec<String>> {
        match self {
            Self::Mock => Ok(group_name.split('-').map(str::to_string).collect()),
            Self::Pacman => {
                let output = std::process::Command::new("pacman")
                    .arg("-Sqg")
                    .arg(group_name)
                    .stderr(std::process::Stdio::inherit())
                    .output()?;
                if !output.status.success() {
                    return Err(PackageBuildError::GroupResolution(
                        group_name.to_string(),
                        format!("pacman exited with {}", output.status),
                    ));
                }

                Ok(String::from_utf8_lossy(&output.stdout)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect())
            }
        }
    }
}

/// Renders package relations into `.PKGINFO` lines, e.g. `depend = linux` or
/// `conflict = holo<0.5`.
pub(super) fn compile_relations(relation_kind: &str, relations: &[PackageRelation]) -> String {
    if relations.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(relations.len());
    for relation in relations {
        if relation.constraints.is_empty() {
            lines.push(format!("{} = {}", relation_kind, relation.related_package));
        } else {
            for constraint in &relation.constraints {
                lines.push(format!(
                    "{} = {}{}{}",
                    relation_kind, relation.related_package, constraint.relation, constraint.version
                ));
            }
        }
    }

    lines.join("\n") + "\n"
}

/// Like [compile_relations], but resolves the special requirement syntax
/// (references to groups, exclusion of packages and groups).
pub(super) fn compile_requirements(
    relation_kind: &str,
    relations: &[PackageRelation],
    resolver: &GroupResolver,
) -> Result<String> {
    // accept marks which package names will be included in the result
    // (e.g. "except:foo" sets accept["foo"] = false)
    let mut accept = BTreeMap::<String, bool>::new();

    // read all input relations, keeping those that are plain package
    // relations (not groups or negations)
    let mut direct_relations = vec![];
    for relation in relations {
        let name = relation.related_package.as_str();
        let (name, is_negated) = match name.strip_prefix("except:") {
            Some(rest) => (rest, true),
            None => (name, false),
        };
        let (name, is_group) = match name.strip_prefix("group:") {
            Some(rest) => (rest, true),
            None => (name, false),
        };

        if is_group {
            // accept the group's packages if not negated
            for package_name in resolver.resolve(name)? {
                accept.insert(package_name, !is_negated);
            }
        } else {
            accept.insert(name.to_string(), !is_negated);
            if !is_negated {
                direct_relations.push(relation.clone());
            }
        }
    }

    // prune all not-accepted packages from the direct relations
    let mut resolved = Vec::with_capacity(direct_relations.len());
    for relation in direct_relations {
        if accept.remove(&relation.related_package) == Some(true) {
            resolved.push(relation);
        }
    }

    // all names still marked accepted were only referenced through groups;
    // they become trivial relations, sorted by name
    for (package_name, accepted) in accept {
        if accepted {
            resolved.push(PackageRelation::new(package_name));
        }
    }

    Ok(compile_relations(relation_kind, &resolved))
}
