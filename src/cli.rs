use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Keep a board of sound clips and play them", long_about = None)]
pub struct Args {
    /// JSON file holding the sound registry
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,

    /// ALSA output device
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all sounds
    List,

    /// List favorite sounds in order
    Favorites,

    /// Show one sound
    Info { id: String },

    /// Add an audio file; prompts for the path when none is given
    Add { path: Option<PathBuf> },

    /// Add every audio file below a folder
    Import { dir: PathBuf },

    Remove { id: String },

    Rename { id: String, title: String },

    Category { id: String, category: u8 },

    /// Toggle whether a sound is a favorite
    Favorite { id: String },

    /// Play a sound until it ends or Ctrl-C
    Play { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::parse_from(["soundboard", "play", "s1", "-d", "hw:0", "-vv"]);
        assert_eq!(args.device.as_deref(), Some("hw:0"));
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Commands::Play { id } if id == "s1"));
    }

    #[test]
    fn add_path_is_optional() {
        let args = Args::parse_from(["soundboard", "add"]);
        assert!(matches!(args.command, Commands::Add { path: None }));
    }

    #[test]
    fn definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
