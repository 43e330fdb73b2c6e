// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command},
    std::{path::PathBuf, str::FromStr},
    thiserror::Error,
    wincert::{
        CertificateManager, DuctRunner, Settings, SystemDesktop, SystemStore, WincertError,
    },
    wincert_common::logging::{level_from_verbosity, logger_with_level},
};

const CREATE_AUTHORITY_ABOUT: &str = "\
Create a self-signed certificate authority.

makecert.exe is launched and its password popups are answered by sending
keystrokes to them. Do not use the keyboard or mouse until this command
finishes or the keystrokes may go to the wrong window.

The private key and certificate are written to the given paths. The
certificate is valid from the day before today until --valid-hours from now
and is added to the trusted root (Root) certificate store.
";

const CREATE_PACKAGE_ABOUT: &str = "\
Create a code signing package (.pfx) issued by an authority.

The authority's private key and certificate must exist, e.g. from
`create-authority`. The same password unlocks the authority key and protects
the new package.

Like `create-authority`, this answers makecert.exe popups with keystrokes.
";

const REMOVE_ABOUT: &str = "\
Remove certificates from the system certificate stores.

TOKEN is a certutil match token: a serial number, a SHA-1 certificate hash, a
public key hash and so on.

By default the Root and CA stores are searched and it is an error only if
neither contains a match.
";

const SIGN_ABOUT: &str = "\
Sign a file with a code signing package.

The configured timestamp servers are tried in order until signing succeeds.
";

const CONFIG_ABOUT: &str = "\
Path to a YAML settings file.

Recognized keys: sdk_path, certutil_path, scratch_dir,
authority_hash_algorithm, timestamp_servers (list of `url` and optional
`digest`) and popup (poll_interval_ms, poll_attempts, activation_settle_ms,
keystroke_settle_ms, dialog_settle_ms, verify_each_dialog).
";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Wincert(#[from] WincertError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

type Manager = CertificateManager<SystemDesktop, DuctRunner>;

fn add_password_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("password")
                .long("password")
                .value_name("PASSWORD")
                .help("Private key password"),
        )
        .arg(
            Arg::new("password_file")
                .long("password-file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a file whose first line is the private key password"),
        )
        .group(
            ArgGroup::new("password_source")
                .args(["password", "password_file"])
                .required(true),
        )
}

fn path_arg(name: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(long)
        .value_name("PATH")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn get_password(args: &ArgMatches) -> Result<String> {
    if let Some(password) = args.get_one::<String>("password") {
        return Ok(password.to_string());
    }

    let path = args
        .get_one::<PathBuf>("password_file")
        .expect("password_source group is required");
    let data = std::fs::read_to_string(path)?;

    Ok(data.lines().next().unwrap_or_default().to_string())
}

fn get_path<'a>(args: &'a ArgMatches, name: &str) -> &'a PathBuf {
    args.get_one::<PathBuf>(name)
        .expect("required argument should be present")
}

fn get_string<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name)
        .expect("required argument should be present")
}

fn manager_and_logger(args: &ArgMatches) -> Result<(Manager, slog::Logger)> {
    let logger = logger_with_level(level_from_verbosity(args.get_count("verbose")));

    let settings = match args.get_one::<PathBuf>("config") {
        Some(path) => Settings::from_yaml_path(path)?,
        None => Settings::default(),
    };

    Ok((
        CertificateManager::new(settings, SystemDesktop::new(), DuctRunner),
        logger,
    ))
}

/// Run the CLI, returning the process exit code.
pub fn run_cli() -> Result<i32> {
    let app = Command::new("wincert")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Create Windows code signing certificates and sign with them")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a YAML settings file")
                .long_help(CONFIG_ABOUT),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let app = app.subcommand(add_password_args(
        Command::new("create-authority")
            .about("Create a self-signed certificate authority")
            .long_about(CREATE_AUTHORITY_ABOUT)
            .arg(
                Arg::new("subject")
                    .long("subject")
                    .required(true)
                    .help("Common name of the authority"),
            )
            .arg(path_arg(
                "key",
                "key",
                "Where to write the private key (.pvk)",
            ))
            .arg(path_arg(
                "cert",
                "cert",
                "Where to write the certificate (.cer)",
            ))
            .arg(
                Arg::new("valid_hours")
                    .long("valid-hours")
                    .value_name("HOURS")
                    .value_parser(value_parser!(i64).range(1..))
                    .default_value("24")
                    .help("Number of hours the certificate is valid for"),
            ),
    ));

    let app = app.subcommand(add_password_args(
        Command::new("create-package")
            .about("Create a code signing package (.pfx) issued by an authority")
            .long_about(CREATE_PACKAGE_ABOUT)
            .arg(
                Arg::new("subject")
                    .long("subject")
                    .required(true)
                    .help("Common name of the issuing authority"),
            )
            .arg(path_arg(
                "authority_key",
                "authority-key",
                "The authority's private key (.pvk)",
            ))
            .arg(path_arg(
                "authority_cert",
                "authority-cert",
                "The authority's certificate (.cer)",
            ))
            .arg(path_arg(
                "output",
                "output",
                "Where to write the package (.pfx)",
            )),
    ));

    let app = app.subcommand(
        Command::new("remove")
            .about("Remove certificates from the system certificate stores")
            .long_about(REMOVE_ABOUT)
            .arg(
                Arg::new("token")
                    .required(true)
                    .value_name("TOKEN")
                    .help("Certificate match token"),
            )
            .arg(
                Arg::new("store")
                    .long("store")
                    .value_parser(["Root", "CA", "My"])
                    .help("Only remove from this store"),
            ),
    );

    let app = app.subcommand(add_password_args(
        Command::new("sign")
            .about("Sign a file with a code signing package")
            .long_about(SIGN_ABOUT)
            .arg(path_arg(
                "package",
                "package",
                "Code signing package (.pfx)",
            ))
            .arg(
                Arg::new("path")
                    .required(true)
                    .value_name("PATH")
                    .value_parser(value_parser!(PathBuf))
                    .help("File to sign"),
            ),
    ));

    let mut app = app.subcommand(
        Command::new("verify")
            .about("Verify the signature of a file. Exits 0 when signed, 1 otherwise")
            .arg(
                Arg::new("path")
                    .required(true)
                    .value_name("PATH")
                    .value_parser(value_parser!(PathBuf))
                    .help("File to verify"),
            ),
    );

    let matches = app.clone().get_matches();

    match matches.subcommand() {
        Some(("create-authority", args)) => command_create_authority(args),
        Some(("create-package", args)) => command_create_package(args),
        Some(("remove", args)) => command_remove(args),
        Some(("sign", args)) => command_sign(args),
        Some(("verify", args)) => command_verify(args),
        Some((command, _)) => Err(CliError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(0)
        }
    }
}

fn command_create_authority(args: &ArgMatches) -> Result<i32> {
    let (manager, logger) = manager_and_logger(args)?;
    let password = get_password(args)?;
    let valid_hours = *args
        .get_one::<i64>("valid_hours")
        .expect("valid_hours has a default value");

    manager.create_authority(
        &logger,
        get_string(args, "subject"),
        &password,
        get_path(args, "key"),
        get_path(args, "cert"),
        valid_hours,
    )?;

    Ok(0)
}

fn command_create_package(args: &ArgMatches) -> Result<i32> {
    let (manager, logger) = manager_and_logger(args)?;
    let password = get_password(args)?;

    manager.create_end_entity_package(
        &logger,
        get_string(args, "subject"),
        &password,
        get_path(args, "authority_key"),
        get_path(args, "authority_cert"),
        get_path(args, "output"),
    )?;

    Ok(0)
}

fn command_remove(args: &ArgMatches) -> Result<i32> {
    let (manager, logger) = manager_and_logger(args)?;
    let token = get_string(args, "token");

    let removed = match args.get_one::<String>("store") {
        Some(store) => {
            manager.remove_from_single_store(&logger, token, SystemStore::from_str(store)?)?
        }
        None => manager.remove_from_store(&logger, token)?,
    };

    slog::info!(logger, "removed {} certificates", removed);

    Ok(0)
}

fn command_sign(args: &ArgMatches) -> Result<i32> {
    let (manager, logger) = manager_and_logger(args)?;
    let password = get_password(args)?;

    manager.sign(
        &logger,
        get_path(args, "path"),
        get_path(args, "package"),
        &password,
    )?;

    Ok(0)
}

fn command_verify(args: &ArgMatches) -> Result<i32> {
    let (manager, logger) = manager_and_logger(args)?;
    let path = get_path(args, "path");

    if manager.is_signed(&logger, path)? {
        slog::info!(logger, "{} is signed", path.display());
        Ok(0)
    } else {
        slog::warn!(logger, "{} is not signed", path.display());
        Ok(1)
    }
}
