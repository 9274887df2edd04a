use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fuser::MountOption;
use log::{error, info};

use blockfs::consts::{DISK_SIZE, SECTOR_SIZE};
use blockfs::{BlockFS, FileDrive, FuseDriver, Owner};

#[derive(Parser)]
#[command(name = "blockfs")]
#[command(about = "Mount a single-image inode file system through FUSE")]
struct Args {
    /// Directory to mount the volume on
    mountpoint: PathBuf,

    /// Disk image backing the volume, created when missing
    #[arg(short, long, default_value = "DISKFILE")]
    image: PathBuf,

    /// Discard the image contents and build an empty volume
    #[arg(short, long)]
    format: bool,

    /// Let other users access the mount
    #[arg(long)]
    allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    auto_unmount: bool,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let drive = FileDrive::open_or_create(&args.image, DISK_SIZE, SECTOR_SIZE)?;
    let owner = Owner::of_path(&args.image)?;
    let fs = if args.format {
        BlockFS::format(drive, owner)?
    } else {
        BlockFS::mount(drive, owner)?
    };

    let mut options = vec![MountOption::FSName("blockfs".to_string())];
    if args.allow_other {
        options.push(MountOption::AllowOther);
    }
    if args.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }

    info!("mounting {} on {}", args.image.display(), args.mountpoint.display());
    fuser::mount2(FuseDriver::new(fs), &args.mountpoint, &options)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
