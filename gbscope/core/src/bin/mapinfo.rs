use clap::Parser;
use gbscope_core::{RegionTable, SymbolMap};
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mapinfo",
    about = "Inspect a NoICE memory-map file the way the profiler will see it."
)]
struct Args {
    /// Memory-map file (.noi) to load.
    map: PathBuf,

    /// Restrict output to one ROM bank.
    #[arg(long)]
    bank: Option<u8>,

    /// Emit machine-readable JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Serialize)]
struct BankReport<'a> {
    bank: u8,
    regions: Vec<RegionRow<'a>>,
}

#[derive(Serialize)]
struct RegionRow<'a> {
    symbol: &'a str,
    addr: u16,
    end: u16,
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(&args.map)?;
    let map = SymbolMap::parse(&text);
    let table = RegionTable::build(&map);

    if map.user_symbols_missing() {
        eprintln!(
            "warning: no usable symbols in {}; only interrupt vectors will be attributed",
            args.map.display()
        );
    }

    let banks: Vec<BankReport> = table
        .bank_ids()
        .into_iter()
        .filter(|id| args.bank.map_or(true, |want| want == *id))
        .map(|id| BankReport {
            bank: id,
            regions: table
                .bank(id)
                .iter()
                .map(|r| RegionRow {
                    symbol: map.name(r.sym),
                    addr: r.addr,
                    end: r.end,
                })
                .collect(),
        })
        .collect();

    if args.json {
        let doc = serde_json::json!({
            "symbols": map.symbols(),
            "banks": banks,
            "stats": map.stats(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    for report in &banks {
        println!("bank {:02}", report.bank);
        for row in &report.regions {
            println!("  0x{:04X}..0x{:04X}  {}", row.addr, row.end, row.symbol);
        }
    }
    let stats = map.stats();
    println!(
        "{} symbols ({} accepted, {} rejected, {} duplicate, {} skipped lines)",
        map.len(),
        stats.accepted,
        stats.rejected,
        stats.duplicates,
        stats.skipped
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
