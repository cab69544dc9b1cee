use std::{
    env,
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Result, anyhow};
use clap::Parser;
use env_logger::Builder as LoggerBuilder;
use log::{LevelFilter, info};

use soundboard::{
    SoundEvent, SoundService, Store,
    cli::{self, Commands},
    config::Settings,
    media::{AUDIO_EXTENSIONS, SoundRecord},
    player::OutputDevice,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn init_env_logger(verbosity: u8) {
    let filter = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = LoggerBuilder::new();
    builder.filter(None, filter);
    if let Ok(rust_log) = env::var("RUST_LOG") {
        builder.parse_filters(&rust_log);
    }
    builder.init();
}

#[cfg(feature = "alsa")]
fn output_device(name: &str) -> Box<dyn OutputDevice> {
    Box::new(soundboard::player::AlsaOutput::new(name))
}

#[cfg(not(feature = "alsa"))]
fn output_device(_name: &str) -> Box<dyn OutputDevice> {
    Box::new(soundboard::player::NoOutput)
}

/// Reads a path from stdin; an empty line cancels.
fn stdin_picker() -> Option<PathBuf> {
    print!("Audio file ({}), empty to cancel: ", AUDIO_EXTENSIONS.join(", "));
    io::stdout().flush().ok()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    let line = line.trim();
    (!line.is_empty()).then(|| PathBuf::from(line))
}

fn print_sound(id: &str, record: &SoundRecord) {
    println!(
        "{}{id}  {}  [category {}]  {}  {}",
        if record.favorite { "* " } else { "  " },
        record.title,
        record.category,
        record.duration.as_deref().unwrap_or("-:--"),
        record
            .file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(virtual)".into()),
    );
}

fn require(found: bool, id: &str) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(anyhow!("no sound with id {id}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_env_logger(args.verbose);

    let settings = Settings::load();
    let data_file = settings.resolve_data_file(args.data_file.as_deref());
    let device = args.device.unwrap_or(settings.device);
    info!("Using data file {} and output {device}", data_file.display());

    let mut service = SoundService::new(Store::new(data_file), output_device(&device))
        .with_default_category(settings.default_category);
    service.subscribe(|ev| match ev {
        SoundEvent::PlaybackError(id, message) => eprintln!("{id}: {message}"),
        ev => info!("{ev:?}"),
    });

    match args.command {
        Commands::List => {
            for (id, record) in service.get_all_sounds() {
                print_sound(id.as_str(), record);
            }
        }
        Commands::Favorites => {
            for sound in service.list_favorites() {
                print_sound(sound.id.as_str(), &sound.record);
            }
        }
        Commands::Info { id } => {
            let record = service
                .get_sound(&id)
                .ok_or_else(|| anyhow!("no sound with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        Commands::Add { path } => {
            let mut picker = move || path.clone().or_else(stdin_picker);
            match service.select_and_add_sound_file(&mut picker) {
                Some(id) => println!("{id}"),
                None => println!("cancelled"),
            }
        }
        Commands::Import { dir } => {
            for id in service.add_directory(&dir) {
                println!("{id}");
            }
        }
        Commands::Remove { id } => require(service.remove_sound(&id), &id)?,
        Commands::Rename { id, title } => {
            require(service.update_sound(&id, |r| r.title = title), &id)?;
        }
        Commands::Category { id, category } => {
            require(service.update_sound(&id, |r| r.category = category), &id)?;
        }
        Commands::Favorite { id } => {
            require(service.get_sound(&id).is_some(), &id)?;
            let favorite = service.toggle_favorite(&id);
            println!("{}", if favorite { "favorite" } else { "not a favorite" });
        }
        Commands::Play { id } => play(&mut service, &id).await?,
    }

    Ok(())
}

async fn play(service: &mut SoundService, id: &str) -> Result<()> {
    require(service.get_sound(id).is_some(), id)?;
    if !service.play_sound(id) {
        return Err(anyhow!("could not play {id}"));
    }

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                service.stop_sound();
                break;
            }
            _ = ticker.tick() => {
                service.poll_playback();
                // virtual sounds have nothing to wait for
                if service.get_sound(id).is_some_and(|r| r.is_virtual()) {
                    service.stop_sound();
                }
                if service.current_playing().is_none() {
                    break;
                }
            }
        }
    }

    Ok(())
}
