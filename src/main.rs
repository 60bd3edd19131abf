use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use pagedb::file::{FileHandle, PAGE_SIZE, PageCounters, PagedFileManager};
use pagedb::index::{IndexManager, MAX_KEY_SIZE};
use pagedb::record::{Attribute, SlottedPage};

/// Inspect record and index files
#[derive(Debug, Parser)]
#[command(name = "pagedb", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print slot statistics for every page of a record file
    Pages { file: PathBuf },
    /// Print the B+ tree of an index file as JSON
    Tree {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = KeyType::Int)]
        key_type: KeyType,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyType {
    Int,
    Real,
    Varchar,
}

impl KeyType {
    fn attribute(self) -> Attribute {
        match self {
            KeyType::Int => Attribute::int("key"),
            KeyType::Real => Attribute::real("key"),
            KeyType::Varchar => Attribute::varchar("key", MAX_KEY_SIZE as u32),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut handle = FileHandle::new();

    match cli.command {
        Command::Pages { file } => {
            let pfm = PagedFileManager::new();
            pfm.open_file(&file, &mut handle)?;
            print_pages(&mut handle)?;
            print_counters(handle.counters());
            pfm.close_file(&mut handle)?;
        }
        Command::Tree { file, key_type } => {
            let im = IndexManager::new();
            im.open_file(&file, &mut handle)?;
            let dump = im.dump(&mut handle, &key_type.attribute())?;
            println!("{}", dump.to_json()?);
            print_counters(im.collect_counter_values(&handle));
            im.close_file(&mut handle)?;
        }
    }
    Ok(())
}

fn print_pages(handle: &mut FileHandle) -> Result<(), Box<dyn Error>> {
    let mut buffer = vec![0u8; PAGE_SIZE];
    for page_num in 0..handle.page_count()? {
        handle.read_page(page_num, &mut buffer)?;
        let page = SlottedPage::from_buffer(&mut buffer, page_num)?;
        let stats = page.stats()?;
        println!(
            "page {:>5}: slots={} occupied={} deleted={} forwarded={} moved={} free={}",
            page_num,
            page.slot_count(),
            stats.occupied,
            stats.deleted,
            stats.forwarded,
            stats.moved,
            page.free_space(),
        );
    }
    Ok(())
}

fn print_counters(counters: PageCounters) {
    eprintln!(
        "reads={} writes={} appends={}",
        counters.reads, counters.writes, counters.appends
    );
}
