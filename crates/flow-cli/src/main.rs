//! CLI de operación sobre los checkpoints persistidos en Postgres.
//!
//! ```text
//! flow-cli inspect --flow <UUID>
//! flow-cli list [--waiting <tag>]
//! flow-cli purge --flow <UUID>
//! ```
//!
//! Sólo lee o borra filas: los eventos de un flow los procesa únicamente el
//! worker de su partición.
//!
//! Códigos de salida: 0 ok, 2 uso incorrecto, 4 flow no encontrado, 5 error
//! de backend.
use serde::Serialize;
use uuid::Uuid;

use flow_core::CheckpointStore;
use flow_persistence::{CheckpointRow, PgCheckpointStore, PoolProvider};

const EXIT_USAGE: i32 = 2;
const EXIT_NOT_FOUND: i32 = 4;
const EXIT_BACKEND: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Inspect { flow: Uuid },
    List { waiting: Option<String> },
    Purge { flow: Uuid },
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    flow_id: Uuid,
    owning_identity: &'a str,
    flow_type: &'a str,
    waiting_for: Option<&'a str>,
    suspend_count: i64,
    updated_at: String,
}

impl<'a> From<&'a CheckpointRow> for Summary<'a> {
    fn from(row: &'a CheckpointRow) -> Self {
        Self { flow_id: row.flow_id,
               owning_identity: &row.owning_identity,
               flow_type: &row.flow_type,
               waiting_for: row.waiting_for.as_deref(),
               suspend_count: row.suspend_count,
               updated_at: row.updated_at.to_rfc3339() }
    }
}

fn usage() -> &'static str {
    "uso: flow-cli inspect --flow <UUID> | list [--waiting <tag>] | purge --flow <UUID>"
}

fn parse(args: &[String]) -> Result<Command, String> {
    let Some(cmd) = args.first() else {
        return Err(usage().to_string());
    };
    let mut flow: Option<Uuid> = None;
    let mut waiting: Option<String> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--flow" => {
                i += 1;
                let raw = args.get(i).ok_or("--flow requiere un valor")?;
                flow = Some(Uuid::parse_str(raw).map_err(|e| format!("--flow inválido: {e}"))?);
            }
            "--waiting" => {
                i += 1;
                waiting = Some(args.get(i).ok_or("--waiting requiere un valor")?.clone());
            }
            other => return Err(format!("argumento desconocido: {other}")),
        }
        i += 1;
    }
    let need_flow = |flow: Option<Uuid>| flow.ok_or_else(|| format!("{cmd} requiere --flow <UUID>"));
    match cmd.as_str() {
        "inspect" => Ok(Command::Inspect { flow: need_flow(flow)? }),
        "list" => Ok(Command::List { waiting }),
        "purge" => Ok(Command::Purge { flow: need_flow(flow)? }),
        other => Err(format!("comando desconocido: {other}\n{}", usage())),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("[flow-cli] serialize: {e}"),
    }
}

fn run(cmd: Command, mut store: PgCheckpointStore<PoolProvider>) -> i32 {
    match cmd {
        Command::Inspect { flow } => match store.row(flow) {
            Ok(Some(row)) => {
                print_json(&Summary::from(&row));
                print_json(&row.state);
                0
            }
            Ok(None) => {
                eprintln!("[flow-cli] flow no encontrado: {flow}");
                EXIT_NOT_FOUND
            }
            Err(e) => {
                eprintln!("[flow-cli] error: {e}");
                EXIT_BACKEND
            }
        },
        Command::List { waiting } => match store.rows(waiting.as_deref()) {
            Ok(rows) => {
                let summaries: Vec<Summary<'_>> = rows.iter().map(Summary::from).collect();
                print_json(&summaries);
                0
            }
            Err(e) => {
                eprintln!("[flow-cli] error: {e}");
                EXIT_BACKEND
            }
        },
        Command::Purge { flow } => match store.load(flow) {
            Ok(Some(_)) => match store.delete(flow) {
                Ok(()) => {
                    println!("purgado: flow={flow}");
                    0
                }
                Err(e) => {
                    eprintln!("[flow-cli] error: {e}");
                    EXIT_BACKEND
                }
            },
            Ok(None) => {
                eprintln!("[flow-cli] flow no encontrado: {flow}");
                EXIT_NOT_FOUND
            }
            Err(e) => {
                eprintln!("[flow-cli] error: {e}");
                EXIT_BACKEND
            }
        },
    }
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cmd = match parse(&args) {
        Ok(cmd) => cmd,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(EXIT_USAGE);
        }
    };
    let pool = match flow_persistence::build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[flow-cli] pool error: {e}");
            std::process::exit(EXIT_BACKEND);
        }
    };
    let store = PgCheckpointStore::new(PoolProvider { pool });
    std::process::exit(run(cmd, store));
}
