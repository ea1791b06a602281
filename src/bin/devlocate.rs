// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{env, path::PathBuf, process, str::FromStr};

use clap::{Arg, ArgAction, ArgMatches, Command};
use env_logger::Builder;
use strum::IntoEnumIterator;

use devlocate::{
    classify::DeviceDescriptor,
    cmd::{verify_binaries, SystemRunner},
    config::{DevConfig, DevTree},
    consts::{SearchDir, DEV_ROOT, LINK_DIRS, SYS_ROOT},
    errors::{DevError, DevResult},
    links::{describe, find_links, primary_link},
    locate::{resolve_canonical_path, search_dev_path},
    luks::{correlate, dm_mapping_name, LuksMapper},
    VERSION,
};

/// Configure and initialize the logger.
/// Read log configuration parameters from the environment if RUST_LOG
/// is set. Otherwise, just accept the default configuration, which is
/// to log at the severity of error only.
fn initialize_log() {
    let mut builder = Builder::new();

    if let Ok(s) = env::var("RUST_LOG") {
        builder.parse_filters(&s);
    }

    builder.init()
}

fn device_arg() -> Arg {
    Arg::new("device")
        .required(true)
        .value_name("DEVICE")
        .help("Device name, label, UUID, partition UUID, mapping name, or path")
}

fn cmd() -> Command {
    Command::new("devlocate")
        .version(VERSION)
        .about("Resolve block device references and manage LUKS mappings")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("dev_root")
                .long("dev-root")
                .global(true)
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value(DEV_ROOT)
                .help("Root of the device node hierarchy"),
        )
        .arg(
            Arg::new("sys_root")
                .long("sys-root")
                .global(true)
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value(SYS_ROOT)
                .help("Root of the sysfs hierarchy"),
        )
        .arg(
            Arg::new("key_file")
                .long("key-file")
                .global(true)
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Read the LUKS passphrase from FILE instead of prompting"),
        )
        .arg(
            Arg::new("dry_run")
                .long("dry-run")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print cryptsetup commands instead of executing them"),
        )
        .subcommand(
            Command::new("resolve")
                .about("Print the canonical path of a device")
                .arg(device_arg()),
        )
        .subcommand(
            Command::new("search")
                .about("Like resolve, but fail if a name matches more than one device")
                .arg(device_arg()),
        )
        .subcommand(
            Command::new("describe")
                .about("Describe a device")
                .arg(device_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print everything known about the device as JSON"),
                ),
        )
        .subcommand(
            Command::new("links")
                .about("List the symlinks to a device")
                .arg(device_arg())
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .action(ArgAction::Append)
                        .value_name("DIR")
                        .value_parser(
                            SearchDir::iter()
                                .map(<&'static str>::from)
                                .collect::<Vec<_>>(),
                        )
                        .help("Only look in the given directories"),
                )
                .arg(
                    Arg::new("primary")
                        .long("primary")
                        .action(ArgAction::SetTrue)
                        .help("Print only the least link in name order"),
                ),
        )
        .subcommand(
            Command::new("correlate")
                .about("Pair an encrypted device with the node of its open mapping")
                .arg(device_arg()),
        )
        .subcommand(
            Command::new("dm-name")
                .about("Print the mapping name used when opening a device")
                .arg(device_arg()),
        )
        .subcommand(
            Command::new("luks-format")
                .about("Format a device for LUKS encryption")
                .arg(device_arg()),
        )
        .subcommand(
            Command::new("luks-open")
                .about("Open a LUKS device")
                .arg(device_arg())
                .arg(
                    Arg::new("name")
                        .value_name("NAME")
                        .help("Mapping name; derived from the device if omitted"),
                ),
        )
        .subcommand(
            Command::new("luks-close")
                .about("Close a LUKS mapping")
                .arg(Arg::new("name").required(true).value_name("NAME")),
        )
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> DevResult<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| DevError::Msg(format!("missing required argument {}", name)))
}

fn config_from(matches: &ArgMatches) -> DevConfig {
    let tree = DevTree::new(
        matches
            .get_one::<PathBuf>("dev_root")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEV_ROOT)),
        matches
            .get_one::<PathBuf>("sys_root")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(SYS_ROOT)),
    );
    let config = DevConfig::default()
        .with_tree(tree)
        .with_dry_run(matches.get_flag("dry_run"));
    match matches.get_one::<PathBuf>("key_file") {
        Some(path) => config.with_passphrase_file(path),
        None => config,
    }
}

fn print_optional(label: &str, path: Option<&PathBuf>) {
    match path {
        Some(path) => println!("{}: {}", label, path.display()),
        None => println!("{}: -", label),
    }
}

fn run(matches: &ArgMatches) -> DevResult<()> {
    let (subcommand, sub) = matches
        .subcommand()
        .ok_or_else(|| DevError::Msg("no subcommand given".into()))?;
    let config = config_from(sub);
    let tree = &config.tree;
    let runner = SystemRunner;

    match subcommand {
        "resolve" => {
            println!(
                "{}",
                resolve_canonical_path(tree, required(sub, "device")?)?.display()
            );
        }
        "search" => {
            println!(
                "{}",
                search_dev_path(tree, required(sub, "device")?)?.display()
            );
        }
        "describe" => {
            let canonical = resolve_canonical_path(tree, required(sub, "device")?)?;
            if sub.get_flag("json") {
                // blkid attributes of a device are absent if blkid is.
                let descriptor = DeviceDescriptor::probe(tree, &runner, &canonical);
                let json = serde_json::to_string_pretty(&descriptor)
                    .map_err(|err| DevError::Msg(err.to_string()))?;
                println!("{}", json);
            } else {
                println!("{}", describe(tree, &canonical));
            }
        }
        "links" => {
            let canonical = resolve_canonical_path(tree, required(sub, "device")?)?;
            let dirs = match sub.get_many::<String>("dir") {
                Some(dirs) => dirs
                    .map(|dir| {
                        SearchDir::from_str(dir)
                            .map_err(|err| DevError::Msg(format!("{}: {}", dir, err)))
                    })
                    .collect::<DevResult<Vec<_>>>()?,
                None => LINK_DIRS.to_vec(),
            };
            let links = if sub.get_flag("primary") {
                primary_link(tree, &canonical, &dirs).into_iter().collect()
            } else {
                find_links(tree, &canonical, &dirs)
            };
            for link in links {
                println!("{}", link.display());
            }
        }
        "correlate" => {
            verify_binaries()?;
            let correlation = correlate(&config, &runner, required(sub, "device")?)?;
            print_optional("mapped", correlation.mapped.as_ref());
            print_optional("encrypted", correlation.encrypted.as_ref());
        }
        "dm-name" => {
            println!("{}", dm_mapping_name(tree, required(sub, "device")?)?);
        }
        "luks-format" => {
            if !config.dry_run {
                verify_binaries()?;
            }
            LuksMapper::new(&config, &runner).format(required(sub, "device")?)?;
        }
        "luks-open" => {
            if !config.dry_run {
                verify_binaries()?;
            }
            let device = required(sub, "device")?;
            let name = match sub.get_one::<String>("name") {
                Some(name) => name.clone(),
                None => dm_mapping_name(tree, device)?,
            };
            let mapper = LuksMapper::new(&config, &runner).open(device, None, &name)?;
            println!("{}", mapper.display());
        }
        "luks-close" => {
            if !config.dry_run {
                verify_binaries()?;
            }
            LuksMapper::new(&config, &runner).close(required(sub, "name")?)?;
        }
        other => {
            return Err(DevError::Msg(format!("unknown subcommand {}", other)));
        }
    }
    Ok(())
}

fn main() {
    initialize_log();

    let matches = cmd().get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("Error encountered: {e}");
        process::exit(1);
    }
}
