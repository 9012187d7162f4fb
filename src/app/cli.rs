use std::{
    io::{self, Write},
    path::PathBuf,
    thread,
};

use crossbeam_channel::Receiver;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind},
    execute, terminal,
};
use log::warn;

use crate::config::{ConfigStore, MemoryLimits};
use crate::error::TaskError;
use crate::imagej::{
    environment,
    factory::{LayersMode, TaskRequest},
};
use crate::manager::task_manager::TaskManager;
use crate::models::task::TaskNotification;

const HELP: &str = "\
Commands:
  launch [console]               open ImageJ (console: show its output here)
  layer <image>|folder <image>   create a tile layer
  map <image>|folder <image>     create a map
  objects <image|folder|list> <path>
  holes <image|folder|list> <path>
  crop <image>                   cut a big image into a mosaic
  list | status <id> | output <id> | kill <id> | dismiss <id>
  config [path <dir>] [memory <MB>] [stack <MB>]
  check                          verify the ImageJ installation
  exit";

pub struct Session {
    pub manager: TaskManager,
    pub store: ConfigStore,
    pub limits: MemoryLimits,
}

/// Prints task alerts as they arrive.
pub fn spawn_alert_printer(notifications: Receiver<TaskNotification>) {
    thread::spawn(move || {
        for notification in notifications.iter() {
            println!("\r[alert] {}", notification.message().replace('\n', "\r\n"));
        }
    });
}

pub fn run_cli(session: Session) -> io::Result<()> {
    println!("ImageJ task runner started. Enter a command, 'help', or 'exit' to quit.");
    if session.manager.configuration().path.is_none() {
        println!(
            "ImageJ needs to be configured: install ImageJ and run `config path <dir>` to link it."
        );
    } else if !session.manager.is_imagej_valid() {
        println!("The configured folder does not contain an imagej installation");
    }

    let mut history: Vec<String> = Vec::new();
    loop {
        let input = read_line(&mut history)?;
        let args: Vec<&str> = input.split_whitespace().collect();
        let Some((&command, rest)) = args.split_first() else {
            continue;
        };
        if command == "exit" {
            println!("Exiting the program...");
            break;
        }
        handle_command(&session, command, rest);
    }
    session.manager.shutdown();
    Ok(())
}

fn handle_command(session: &Session, command: &str, args: &[&str]) {
    let manager = &session.manager;
    match command {
        "help" => println!("{}", HELP),
        "launch" => {
            let console = args.first() == Some(&"console");
            if let Some(id) = submit(manager, TaskRequest::LaunchImageJ { console }) {
                println!("ImageJ open (task {})", id);
            }
        }
        "map" | "layer" => {
            let is_map = command == "map";
            let (is_folder, source) = match args {
                ["folder", path] => (true, *path),
                [path] => (false, *path),
                _ => {
                    println!("Usage: {} [folder] <image>", command);
                    return;
                }
            };
            let request = TaskRequest::MapCreation {
                source: source.to_string(),
                is_map,
                is_folder,
            };
            if let Some(id) = submit(manager, request) {
                println!("Created task with ID: {}", id);
            }
        }
        "objects" | "holes" => {
            let (mode, source) = match args {
                [mode, path] => match LayersMode::parse(mode) {
                    Some(mode) => (mode, path.to_string()),
                    None => {
                        println!("Unknown mode '{}': use image, folder or list.", mode);
                        return;
                    }
                },
                _ => {
                    println!("Usage: {} <image|folder|list> <path>", command);
                    return;
                }
            };
            let request = if command == "objects" {
                TaskRequest::ObjectDetection { source, mode }
            } else {
                TaskRequest::HolesDetection { source, mode }
            };
            if let Some(id) = submit(manager, request) {
                println!("Created task with ID: {}", id);
            }
        }
        "crop" => match args {
            [path] => {
                let request = TaskRequest::Crop {
                    source: path.to_string(),
                };
                if let Some(id) = submit(manager, request) {
                    println!("Created task with ID: {}", id);
                }
            }
            _ => println!("Usage: crop <image>"),
        },
        "list" => {
            let tasks = manager.get_all_tasks();
            if tasks.is_empty() {
                println!("No tasks");
                return;
            }
            println!("ID\t Status \t Kind \t Description \t PID");
            println!("{}", "-".repeat(72));
            for task in tasks {
                let pid = task.pid.map_or_else(|| "NONE".to_string(), |pid| pid.to_string());
                println!(
                    "{}\t {:?} \t {} \t {} \t {}",
                    task.id,
                    task.status,
                    task.kind.label(),
                    task.description,
                    pid
                );
            }
        }
        "status" | "output" | "kill" | "dismiss" => {
            let Some(id) = parse_id(args) else {
                return;
            };
            match command {
                "status" => match manager.get_task_status(id) {
                    Some(status) => println!("Task {} status: {:?}", id, status),
                    None => println!("Task {} not found", id),
                },
                "output" => {
                    for line in manager.get_task_output(id) {
                        println!("{}", line);
                    }
                }
                "kill" => match manager.kill_task(id) {
                    Ok(()) => println!("Sent kill signal for task {}", id),
                    Err(e) => println!("{}", e),
                },
                _ => match manager.dismiss(id) {
                    Ok(()) => println!("Task {} dismissed", id),
                    Err(e) => println!("{}", e),
                },
            }
        }
        "config" => configure(session, args),
        "check" => match environment::check(&manager.configuration()) {
            Ok(path) => println!("ImageJ installation found in {}", path.display()),
            Err(e) => println!("{}", e),
        },
        other => println!("Unknown command: {}. Type 'help' for the list.", other),
    }
}

fn submit(manager: &TaskManager, request: TaskRequest) -> Option<u64> {
    match manager.submit(request) {
        Ok(id) => Some(id),
        Err(TaskError::NotConfigured(_)) => {
            println!("You need to install ImageJ and configure the extension");
            None
        }
        Err(e) => {
            println!("{}", e);
            None
        }
    }
}

/// Configuration form: edits are applied, then always persisted.
fn configure(session: &Session, args: &[&str]) {
    let manager = &session.manager;
    let mut configuration = manager.configuration();

    if args.is_empty() {
        println!(
            "path: {}\nmemory: {} MB (max {})\nstack memory: {} MB (max {})",
            configuration
                .path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            configuration.memory,
            session.limits.max_memory,
            configuration.stack_memory,
            session.limits.max_stack_memory
        );
        return;
    }

    for pair in args.chunks(2) {
        let result = match pair {
            ["path", value] => {
                configuration.set_path(Some(PathBuf::from(value)));
                Ok(())
            }
            ["memory", value] => match value.parse() {
                Ok(mb) => configuration.set_memory(mb, &session.limits),
                Err(_) => {
                    println!("Invalid memory value '{}'.", value);
                    return;
                }
            },
            ["stack", value] => match value.parse() {
                Ok(mb) => configuration.set_stack_memory(mb, &session.limits),
                Err(_) => {
                    println!("Invalid stack memory value '{}'.", value);
                    return;
                }
            },
            _ => {
                println!("Usage: config [path <dir>] [memory <MB>] [stack <MB>]");
                return;
            }
        };
        if let Err(e) = result {
            println!("{}", e);
            return;
        }
    }

    manager.set_configuration(configuration.clone());
    if let Err(e) = session.store.save(&configuration) {
        warn!("Saving configuration failed: {}", e);
        println!("Error saving ImageJ options");
    }
    if environment::is_valid(&configuration) {
        println!("ImageJ configured");
    } else {
        println!("The selected folder does not contain an imagej installation");
    }
}

fn parse_id(args: &[&str]) -> Option<u64> {
    match args.first() {
        Some(raw) => match raw.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                println!("Invalid task ID format.");
                None
            }
        },
        None => {
            println!("Task ID must be specified.");
            None
        }
    }
}

/// Reads one line in raw mode with Up/Down history.
fn read_line(history: &mut Vec<String>) -> io::Result<String> {
    terminal::enable_raw_mode()?;
    let result = read_line_raw(history);
    terminal::disable_raw_mode()?;
    let input = result?;
    if !input.trim().is_empty() {
        history.push(input.clone());
    }
    Ok(input)
}

fn read_line_raw(history: &[String]) -> io::Result<String> {
    let mut stdout = io::stdout();
    let mut input = String::new();
    let mut history_index = history.len();
    print!("\r>>> ");
    stdout.flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }
        match key_event.code {
            KeyCode::Enter => {
                print!("\r\n");
                stdout.flush()?;
                return Ok(input);
            }
            KeyCode::Up => {
                history_index = history_index.saturating_sub(1);
                if let Some(command) = history.get(history_index) {
                    input = command.clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if history_index < history.len() {
                    history_index += 1;
                }
                input = history.get(history_index).cloned().unwrap_or_default();
                redraw(&input)?;
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("{}", c);
                stdout.flush()?;
            }
            KeyCode::Backspace => {
                input.pop();
                redraw(&input)?;
            }
            _ => {}
        }
    }
}

fn redraw(input: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!(">>> {}", input);
    stdout.flush()
}
