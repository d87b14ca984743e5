use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pet_shelter::{AdoptRequest, Config, Database, Pet, PetService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pet-shelter", version, about = "Digital pet shelter admin tool")]
struct Cli {
    /// Path to the SQLite database file (defaults to PET_DB_PATH or pets.db)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Create the database schema
    Init,
    /// Register a user
    AddUser {
        username: String,
        email: Option<String>,
    },
    /// Adopt a pet on behalf of a user
    Adopt {
        username: String,
        name: String,
        species: String,
    },
    /// List a user's pets
    List { username: String },
    /// List pets without an owner
    Public,
    /// Feed, play with or rest a pet
    Care {
        username: String,
        pet_id: String,
        /// feed, play or rest
        action: String,
    },
    /// Show a pet's activity log
    Events { username: String, pet_id: String },
}

fn main() -> Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    let service = PetService::new(Arc::new(db.clone()), Arc::new(db));

    match cli.command {
        Commands::Init => {
            println!("✓ Database initialized at {:?}", config.db_path);
        }
        Commands::AddUser { username, email } => {
            let user = service.register_user(&username, email.as_deref())?;
            println!("✓ Registered {} ({})", user.username, user.id);
        }
        Commands::Adopt {
            username,
            name,
            species,
        } => {
            let pet =
                service.adopt_pet_by_username(&username, AdoptRequest::new(&name, &species))?;
            print_pet(&pet);
        }
        Commands::List { username } => {
            let user = service.resolve_username(&username)?;
            let pets = service.list_owned_pets(&user.id)?;
            println!("{} pet(s) owned by {}", pets.len(), user.username);
            pets.iter().for_each(print_pet);
        }
        Commands::Public => {
            let pets = service.list_public_pets()?;
            println!("{} public pet(s)", pets.len());
            pets.iter().for_each(print_pet);
        }
        Commands::Care {
            username,
            pet_id,
            action,
        } => {
            let user = service.resolve_username(&username)?;
            let pet = service.apply_care_action(&pet_id, &user.id, &action)?;
            print_pet(&pet);
        }
        Commands::Events { username, pet_id } => {
            let user = service.resolve_username(&username)?;
            for event in service.pet_activity(&pet_id, &user.id)? {
                println!(
                    "{}  {:<8} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    event.data
                );
            }
        }
    }

    Ok(())
}

fn print_pet(pet: &Pet) {
    let care = if pet.stats.needs_care() { "  ⚠ needs care" } else { "" };
    println!(
        "{}  {:<30} {:<7} {:<10} hunger={:>3} happiness={:>3} energy={:>3}{}",
        pet.id,
        pet.name,
        pet.species.as_str(),
        pet.rarity.as_str(),
        pet.stats.hunger,
        pet.stats.happiness,
        pet.stats.energy,
        care
    );
}
