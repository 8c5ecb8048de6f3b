#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Action;
use crate::domain::models::ChatData;
use crate::domain::models::CollectionName;
use crate::domain::models::ComponentRef;
use crate::domain::models::ComponentType;
use crate::domain::models::Project;
use crate::domain::models::StoreSnapshot;
use crate::domain::models::SyncOutcome;
use crate::domain::services::ChatComponent;
use crate::domain::services::LocalStore;
use crate::domain::services::Persistence;
use crate::domain::services::ProjectTree;
use crate::domain::services::RemoteBridge;
use crate::domain::services::SyncWorker;
use crate::infrastructure::collections::CollectionManager;
use crate::infrastructure::endpoints::EndpointManager;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

pub fn log_path() -> path::PathBuf {
    if let Ok(dir) = std::env::var("CANVAS_LOG_DIR") {
        return path::PathBuf::from(dir).join("debug.log");
    }

    return dirs::cache_dir()
        .unwrap_or_else(|| return path::PathBuf::from("."))
        .join("canvas/debug.log");
}

pub fn format_project(snapshot: &StoreSnapshot, project: &Project) -> String {
    let tree = ProjectTree::new(&snapshot.items);
    let mut lines = vec![
        format!("{} (ID: {})", project.name, project.id),
        format!("Path: {}", tree.path(&project.id)),
    ];

    if project.components.is_empty() {
        lines.push("No components yet.".to_string());
        return lines.join("\n");
    }

    lines.push("Components:".to_string());
    for (idx, component) in project.components.iter().enumerate() {
        if component.kind != ComponentType::Chat {
            lines.push(format!("- ({idx}) {}", component.kind));
            continue;
        }

        let chat = match ChatData::from_value(&component.data) {
            Ok(chat) => chat,
            Err(err) => {
                lines.push(format!("- ({idx}) {}, {err}", component.kind));
                continue;
            }
        };
        lines.push(format!(
            "- ({idx}) {}, {} messages",
            component.kind,
            chat.messages.len()
        ));
        for message in chat.messages.iter() {
            for line in message.summary().split('\n') {
                lines.push(format!("    {line}"));
            }
        }
    }

    return lines.join("\n");
}

pub fn format_outcome(
    snapshot: &StoreSnapshot,
    component: &ComponentRef,
    outcome: &SyncOutcome,
) -> String {
    let path = ProjectTree::new(&snapshot.items).path(&component.project_id);
    let name = if path.is_empty() {
        component.project_id.to_string()
    } else {
        path
    };

    return format!(
        "{name} ({}) {}: {outcome}",
        component.index, component.kind
    );
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

/// Loads the persisted store. A store that fails to load is an error here,
/// so nothing gets saved over the broken file.
async fn open_store() -> Result<(LocalStore, Persistence)> {
    let persistence = Persistence::default();
    let store = LocalStore::default();
    store.init(&persistence).await;

    if let Some(err) = &store.get_snapshot().error {
        bail!(format!(
            "Failed to load projects from {}: {err}",
            persistence.path().to_string_lossy()
        ));
    }

    return Ok((store, persistence));
}

/// The project named by `--project`, otherwise the selected one.
fn target_project(snapshot: &StoreSnapshot, arg: Option<&String>) -> Result<String> {
    if let Some(id) = arg {
        if snapshot.project(id).is_none() {
            bail!(format!("No project with ID {id}"));
        }
        return Ok(id.to_string());
    }

    if let Some(project) = snapshot.selected_project() {
        return Ok(project.id.to_string());
    }

    bail!("No project selected. Run `canvas projects select` or pass --project.")
}

fn chat_ref(project: &Project, index: Option<&usize>) -> Result<ComponentRef> {
    let idx = match index {
        Some(idx) => *idx,
        None => {
            match project
                .components
                .iter()
                .position(|e| return e.kind == ComponentType::Chat)
            {
                Some(idx) => idx,
                None => bail!(format!(
                    "Project {} has no Chat component. Add one with `canvas components add --type Chat`.",
                    project.name
                )),
            }
        }
    };

    match project.component(idx) {
        Some(component) if component.kind == ComponentType::Chat => {
            return Ok(ComponentRef::new(&project.id, idx, component.kind));
        }
        Some(component) => {
            bail!(format!("Component {idx} is a {}, not a Chat", component.kind));
        }
        None => {
            bail!(format!("Project {} has no component {idx}", project.name));
        }
    }
}

async fn projects_list() -> Result<()> {
    let (store, _persistence) = open_store().await?;
    let snapshot = store.get_snapshot();
    let lines = ProjectTree::new(&snapshot.items).render(snapshot.selected_id.as_deref());

    if lines.is_empty() {
        println!("There are no projects yet. Create one with `canvas projects add`.");
    } else {
        println!("{}", lines.join("\n"));
    }

    return Ok(());
}

async fn projects_add(matches: &ArgMatches) -> Result<()> {
    let (store, persistence) = open_store().await?;
    let name = matches
        .get_one::<String>("name")
        .map(|e| return e.to_string())
        .unwrap_or_default();
    let folder = matches.get_one::<String>("folder");

    let id = match folder {
        Some(folder) => match store.add_project_in(&name, Some(folder)) {
            Some(id) => id,
            None => bail!(format!("{folder} is not a folder")),
        },
        None => store.add_project(&name),
    };
    if matches.get_flag("select") {
        store.select_project(Some(&id));
    }

    persistence.save(&store.get_snapshot()).await?;
    println!("Created project {name} (ID: {id})");

    return Ok(());
}

async fn projects_select(matches: &ArgMatches) -> Result<()> {
    let (store, persistence) = open_store().await?;
    let snapshot = store.get_snapshot();

    let id = match matches.get_one::<String>("id") {
        Some(id) => Some(target_project(&snapshot, Some(id))?),
        None => {
            let tree = ProjectTree::new(&snapshot.items);
            let mut projects = snapshot
                .items
                .values()
                .filter_map(|node| return node.as_project())
                .collect::<Vec<&Project>>();
            if projects.is_empty() {
                println!("There are no projects yet. Create one with `canvas projects add`.");
                return Ok(());
            }
            projects.sort_by_key(|project| return tree.path(&project.id));

            let options = projects
                .iter()
                .map(|project| return format!("{} (ID: {})", tree.path(&project.id), project.id))
                .collect::<Vec<String>>();

            Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Which project would you like to select?")
                .default(0)
                .items(&options)
                .interact_opt()?
                .map(|idx| return projects[idx].id.to_string())
        }
    };

    if let Some(id) = id {
        store.select_project(Some(&id));
        persistence.save(&store.get_snapshot()).await?;
        println!("Selected project {id}");
    }

    return Ok(());
}

async fn projects_show(matches: &ArgMatches) -> Result<()> {
    let (store, _persistence) = open_store().await?;
    let snapshot = store.get_snapshot();
    let id = target_project(&snapshot, matches.get_one::<String>("id"))?;

    if let Some(project) = snapshot.project(&id) {
        println!("{}", format_project(&snapshot, project));
    }

    return Ok(());
}

async fn folders_add(matches: &ArgMatches) -> Result<()> {
    let (store, persistence) = open_store().await?;
    let name = matches
        .get_one::<String>("name")
        .map(|e| return e.to_string())
        .unwrap_or_default();
    let parent = matches.get_one::<String>("parent");

    let id = match store.add_folder(&name, parent.map(|e| return e.as_str())) {
        Some(id) => id,
        None => bail!(format!(
            "{} is not a folder",
            parent.map(|e| return e.as_str()).unwrap_or_default()
        )),
    };

    persistence.save(&store.get_snapshot()).await?;
    println!("Created folder {name} (ID: {id})");

    return Ok(());
}

async fn components_add(matches: &ArgMatches) -> Result<()> {
    let (store, persistence) = open_store().await?;
    let kind_name = matches
        .get_one::<String>("type")
        .map(|e| return e.to_string())
        .unwrap_or_default();
    let kind = match ComponentType::parse(&kind_name) {
        Some(kind) => kind,
        None => bail!(format!("Unknown component type {kind_name}")),
    };

    let snapshot = store.get_snapshot();
    let project_id = match matches.get_one::<String>("project") {
        Some(id) => target_project(&snapshot, Some(id))?,
        None => match snapshot.selected_project() {
            Some(project) => project.id.to_string(),
            None => {
                let id = store.add_project(&format!("New {kind} Project"));
                store.select_project(Some(&id));
                println!("Created and selected project New {kind} Project (ID: {id})");
                id
            }
        },
    };

    let index = match store.assign_component_to_project(&project_id, kind) {
        Some(index) => index,
        None => bail!(format!("No project with ID {project_id}")),
    };
    persistence.save(&store.get_snapshot()).await?;
    println!("Added {kind} component ({index}) to project {project_id}");

    let session = CollectionManager::session_from_config()?;
    if session.is_active() {
        let component = ComponentRef::new(&project_id, index, kind);
        let mut worker = SyncWorker::new(store.clone(), session);
        for (component, outcome) in worker.handle(Action::Reconcile(component)).await {
            println!(
                "{}",
                format_outcome(&store.get_snapshot(), &component, &outcome)
            );
        }
        persistence.save(&store.get_snapshot()).await?;
    }

    return Ok(());
}

async fn chat(matches: &ArgMatches) -> Result<()> {
    let (store, persistence) = open_store().await?;
    let prompt = matches
        .get_one::<String>("prompt")
        .map(|e| return e.to_string())
        .unwrap_or_default();

    let snapshot = store.get_snapshot();
    let project_id = target_project(&snapshot, matches.get_one::<String>("project"))?;
    let component = match snapshot.project(&project_id) {
        Some(project) => chat_ref(project, matches.get_one::<usize>("index"))?,
        None => bail!(format!("No project with ID {project_id}")),
    };

    let session = CollectionManager::session_from_config()?;
    let mut bridge = RemoteBridge::new(store.clone(), session, component);
    let pulled = bridge.reconcile().await;
    tracing::debug!(outcome = %pulled, "Reconciled chat before submitting");

    let chat = ChatComponent::new(store.clone(), EndpointManager::get());
    let res = chat.submit(&mut bridge, &prompt).await;
    persistence.save(&store.get_snapshot()).await?;

    let (message, outcome) = res?;
    println!("{}", message.response);
    println!(
        "\n({}/{}, {outcome})",
        message.settings.provider, message.settings.model
    );

    return Ok(());
}

async fn sync(matches: &ArgMatches) -> Result<()> {
    let (store, persistence) = open_store().await?;
    let session = CollectionManager::session_from_config()?;
    if !session.is_active() {
        bail!("Syncing is disabled. Set remote-url and remote-token to sign in.");
    }

    let mut worker = SyncWorker::new(store.clone(), session.clone());
    let outcomes = match matches.get_one::<String>("project") {
        Some(id) => {
            let id = target_project(&store.get_snapshot(), Some(id))?;
            worker.handle(Action::ReconcileProject(id)).await
        }
        None => worker.handle(Action::SignIn(session)).await,
    };
    persistence.save(&store.get_snapshot()).await?;

    let snapshot = store.get_snapshot();
    if outcomes.is_empty() {
        println!("Nothing to sync.");
    }
    for (component, outcome) in outcomes.iter() {
        println!("{}", format_outcome(&snapshot, component, outcome));
    }

    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    return Command::new("debug")
        .about("Debug helpers for Canvas")
        .hide(true)
        .subcommand(
            Command::new("log-path").about("Output path to debug log file generated when running Canvas with environment variable RUST_LOG=canvas")
        )
        .subcommand(
            Command::new("enum-config").about("List all config keys as strings.")
        )
        .subcommand(
            Command::new("data-path").about("Output path to the projects file.")
        )
        .subcommand(
            Command::new("reset-data").about("Delete the projects file. Remote records are left alone.")
        );
}

fn arg_project() -> Arg {
    return Arg::new("project")
        .short('p')
        .long("project")
        .help("Project ID. Defaults to the selected project.")
        .num_args(1);
}

fn subcommand_projects() -> Command {
    return Command::new("projects")
        .about("Manage projects.")
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List folders and projects as a tree. The selected project is marked with *."))
        .subcommand(
            Command::new("add")
                .about("Create an empty project.")
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Project name. Names don't need to be unique.")
                        .required(true),
                )
                .arg(
                    Arg::new("folder")
                        .short('f')
                        .long("folder")
                        .help("Folder ID to create the project in.")
                        .num_args(1),
                )
                .arg(
                    Arg::new("select")
                        .long("select")
                        .help("Select the project once created.")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("select")
                .about("Select a project by ID. Omit passing any ID to load an interactive selection.")
                .arg(
                    Arg::new("id")
                        .short('i')
                        .long("id")
                        .help("Project ID")
                        .required(false),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print a project and its components.")
                .arg(
                    Arg::new("id")
                        .short('i')
                        .long("id")
                        .help("Project ID. Defaults to the selected project.")
                        .required(false),
                ),
        );
}

fn subcommand_folders() -> Command {
    return Command::new("folders")
        .about("Manage folders.")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("add")
                .about("Create a folder.")
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Folder name.")
                        .required(true),
                )
                .arg(
                    Arg::new("parent")
                        .long("parent")
                        .help("Parent folder ID.")
                        .num_args(1),
                ),
        );
}

fn subcommand_components() -> Command {
    return Command::new("components")
        .about("Manage the components of a project.")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("add")
                .about("Append a component to a project. Without a selected project, a new one is created and selected.")
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .help("Component type.")
                        .required(true)
                        .value_parser(PossibleValuesParser::new(ComponentType::VARIANTS)),
                )
                .arg(arg_project()),
        );
}

fn subcommand_chat() -> Command {
    return Command::new("chat")
        .about("Send a prompt to a Chat component and store the reply.")
        .arg(
            Arg::new("prompt")
                .help("Prompt to send.")
                .required(true),
        )
        .arg(arg_project())
        .arg(
            Arg::new("index")
                .long("index")
                .help("Component index. Defaults to the project's first Chat component.")
                .num_args(1)
                .value_parser(value_parser!(usize)),
        );
}

fn subcommand_sync() -> Command {
    return Command::new("sync")
        .about("Reconcile local projects with the remote collection once.")
        .arg(arg_project());
}

fn arg_global(key: ConfigKey, env: &str, help: &str) -> Arg {
    let default = Config::default(key);
    let help = if default.is_empty() || key == ConfigKey::RemoteToken {
        help.to_string()
    } else {
        format!("{help} [default: {default}]")
    };

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env.to_string())
        .num_args(1)
        .help(help)
        .global(true);
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("canvas")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(subcommand_projects())
        .subcommand(subcommand_folders())
        .subcommand(subcommand_components())
        .subcommand(subcommand_chat())
        .subcommand(subcommand_sync())
        .subcommand(Command::new("watch").about("Keep the selected project in sync until interrupted."))
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_debug())
        .subcommand(Command::new("manpages").about("Generates manpages and outputs to stdout."))
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("CANVAS_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(arg_global(
            ConfigKey::DataDir,
            "CANVAS_DATA_DIR",
            "Directory holding the projects file.",
        ))
        .arg(
            arg_global(
                ConfigKey::Model,
                "CANVAS_MODEL",
                "Model requested by chat components.",
            )
            .short('m'),
        )
        .arg(arg_global(
            ConfigKey::Provider,
            "CANVAS_PROVIDER",
            "Provider hosting the model requested by chat components.",
        ))
        .arg(arg_global(
            ConfigKey::ActionURL,
            "CANVAS_ACTION_URL",
            "URL of the chat action endpoint.",
        ))
        .arg(
            arg_global(
                ConfigKey::RemoteBackend,
                "CANVAS_REMOTE_BACKEND",
                "Remote collection backend. Use none to keep everything local.",
            )
            .value_parser(PossibleValuesParser::new(CollectionName::VARIANTS)),
        )
        .arg(arg_global(
            ConfigKey::RemoteURL,
            "CANVAS_REMOTE_URL",
            "Base URL of the remote collection API.",
        ))
        .arg(arg_global(
            ConfigKey::RemoteToken,
            "CANVAS_REMOTE_TOKEN",
            "Bearer token for the remote collection API. Syncing is off without one.",
        ))
        .arg(arg_global(
            ConfigKey::RemoteCollection,
            "CANVAS_REMOTE_COLLECTION",
            "Name of the remote collection projects are stored in.",
        ))
        .arg(arg_global(
            ConfigKey::RemoteTimeout,
            "CANVAS_REMOTE_TIMEOUT",
            "Time to wait in milliseconds for the remote collection and the action endpoint.",
        ))
        .arg(arg_global(
            ConfigKey::SyncInterval,
            "CANVAS_SYNC_INTERVAL",
            "Seconds between reconciles of the selected project in watch mode. 0 only syncs on start.",
        ));
}

/// Runs the requested command. Returns true when the caller should start the
/// long running watch loop.
pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    println!("{}", log_path().to_string_lossy());
                }
                Some(("enum-config", _)) => {
                    let res = ConfigKey::VARIANTS.join("\n");
                    println!("{}", res);
                }
                Some(("data-path", data_matches)) => {
                    Config::load(build(), vec![&matches, debug_matches, data_matches]).await?;
                    println!("{}", Persistence::default().path().to_string_lossy());
                }
                Some(("reset-data", reset_matches)) => {
                    Config::load(build(), vec![&matches, debug_matches, reset_matches]).await?;
                    let persistence = Persistence::default();
                    persistence.delete().await?;
                    println!("Deleted {}", persistence.path().to_string_lossy());
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(false);
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("manpages", _)) => {
            clap_mangen::Man::new(build()).render(&mut io::stdout())?;
            return Ok(false);
        }
        Some(("projects", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("list", list_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, list_matches]).await?;
                projects_list().await?;
                return Ok(false);
            }
            Some(("add", add_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, add_matches]).await?;
                projects_add(add_matches).await?;
                return Ok(false);
            }
            Some(("select", select_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, select_matches]).await?;
                projects_select(select_matches).await?;
                return Ok(false);
            }
            Some(("show", show_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, show_matches]).await?;
                projects_show(show_matches).await?;
                return Ok(false);
            }
            _ => {
                subcommand_projects().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("folders", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("add", add_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, add_matches]).await?;
                folders_add(add_matches).await?;
                return Ok(false);
            }
            _ => {
                subcommand_folders().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("components", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("add", add_matches)) => {
                Config::load(build(), vec![&matches, subcmd_matches, add_matches]).await?;
                components_add(add_matches).await?;
                return Ok(false);
            }
            _ => {
                subcommand_components().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            chat(subcmd_matches).await?;
            return Ok(false);
        }
        Some(("sync", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            sync(subcmd_matches).await?;
            return Ok(false);
        }
        Some(("watch", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        _ => {
            build().print_long_help()?;
            return Ok(false);
        }
    }

    return Ok(true);
}
