// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reporting of errors and warnings on standard error.

The markers written here are part of the contract with the command line
wrapper: errors carry a bold red `!!`, warnings a bold yellow `>>`. Messages
are additionally forwarded to the `log` facade for embedders that run their
own logger.
*/

/// Prints an error message on standard error.
pub fn report_error(message: &str) {
    log::error!("{}", message);
    eprintln!("\x1b[31m\x1b[1m!!\x1b[0m {}", message);
}

/// Prints a warning message on standard error. Warnings are non-fatal.
pub fn report_warning(message: &str) {
    log::warn!("{}", message);
    eprintln!("\x1b[33m\x1b[1m>>\x1b[0m {}", message);
}

/// Warns that a deprecated key was used in a package description.
pub fn warn_deprecated_key(key: &str) {
    report_warning(&format!(
        "The '{}' key is deprecated and will be removed in a future version.",
        key
    ));
}
