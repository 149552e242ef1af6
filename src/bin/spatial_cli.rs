//! Ad-hoc test and benchmark harness for the spatial index.
//!
//! Two modes:
//!
//! - `spatial-cli repl [--hilbert] [--bits N]` — line-oriented commands
//!   on stdin (`insert`, `remove`, `search`, `quit`), 2-D rectangles,
//!   auto-incrementing payload ids.
//! - `spatial-cli bench <dataset> [--csv <out>]` — loads whitespace
//!   separated `lat lon` pairs, feeds them to both tree variants
//!   (scaled by 100 into the Hilbert lattice) and reports insert and
//!   whole-dataset search timings over a ladder of prefix sizes.

use std::fs;
use std::io::{self, BufRead, Write};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::info;
use spatial_rtree::{GuttmanRTree, HilbertRTree, Rect};

/// Scale factor mapping fractional lat/lon onto the integer lattice.
const LATTICE_SCALE: f64 = 100.0;

/// Curve precision for the harness trees.
const HILBERT_BITS: u32 = 32;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("repl") => repl(&args[1..]),
        Some("bench") => bench(&args[1..]),
        _ => {
            eprintln!("usage: spatial-cli repl [--hilbert] [--bits N]");
            eprintln!("       spatial-cli bench <dataset> [--csv <out>]");
            bail!("missing or unknown mode");
        }
    }
}

enum ReplTree {
    Guttman(GuttmanRTree<u64>),
    Hilbert(HilbertRTree<u64>),
}

fn repl(args: &[String]) -> Result<()> {
    let mut bits = HILBERT_BITS;
    let mut hilbert = false;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--hilbert" => hilbert = true,
            "--bits" => {
                bits = it
                    .next()
                    .context("--bits needs a value")?
                    .parse()
                    .context("--bits must be an integer")?;
            }
            other => bail!("unknown repl option {other}"),
        }
    }

    let mut tree = if hilbert {
        ReplTree::Hilbert(HilbertRTree::new(4, 8, 2, bits)?)
    } else {
        ReplTree::Guttman(GuttmanRTree::new(4, 8)?)
    };
    let mut next_id: u64 = 0;

    let stdin = io::stdin();
    let mut out = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => {}
            ["quit"] => break,
            ["insert", coords @ ..] if coords.len() == 4 => {
                let c = parse_coords(coords)?;
                match &mut tree {
                    ReplTree::Guttman(t) => {
                        t.insert(Rect::new(vec![c[0], c[1]], vec![c[2], c[3]])?, next_id)?
                    }
                    ReplTree::Hilbert(t) => t.insert(lattice_rect(&c)?, next_id)?,
                }
                writeln!(out, "inserted {next_id}")?;
                next_id += 1;
            }
            ["remove", coords @ ..] if coords.len() == 4 => {
                let c = parse_coords(coords)?;
                match &mut tree {
                    ReplTree::Guttman(t) => {
                        t.remove(&Rect::new(vec![c[0], c[1]], vec![c[2], c[3]])?)
                    }
                    ReplTree::Hilbert(t) => t.remove(&lattice_rect(&c)?),
                }
                writeln!(out, "removed")?;
            }
            ["search", coords @ ..] if coords.len() == 4 => {
                let c = parse_coords(coords)?;
                let mut ids: Vec<u64> = match &tree {
                    ReplTree::Guttman(t) => t
                        .search(&Rect::new(vec![c[0], c[1]], vec![c[2], c[3]])?)
                        .into_iter()
                        .copied()
                        .collect(),
                    ReplTree::Hilbert(t) => t
                        .search(&lattice_rect(&c)?)
                        .into_iter()
                        .copied()
                        .collect(),
                };
                ids.sort_unstable();
                writeln!(out, "{} results", ids.len())?;
                for id in ids {
                    writeln!(out, "{id}")?;
                }
            }
            _ => writeln!(out, "commands: insert|remove|search x1 y1 x2 y2, quit")?,
        }
        out.flush()?;
    }
    Ok(())
}

fn parse_coords(fields: &[&str]) -> Result<Vec<f64>> {
    fields
        .iter()
        .map(|f| f.parse::<f64>().with_context(|| format!("bad coordinate {f}")))
        .collect()
}

fn lattice_rect(c: &[f64]) -> Result<Rect<i64>> {
    let scaled: Vec<i64> = c.iter().map(|&v| (v * LATTICE_SCALE) as i64).collect();
    Ok(Rect::new(
        vec![scaled[0], scaled[1]],
        vec![scaled[2], scaled[3]],
    )?)
}

struct DataPoint {
    x: i64,
    y: i64,
    id: u64,
}

fn bench(args: &[String]) -> Result<()> {
    let mut dataset = None;
    let mut csv_path = None;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--csv" => csv_path = Some(it.next().context("--csv needs a path")?.clone()),
            other if dataset.is_none() => dataset = Some(other.to_string()),
            other => bail!("unexpected bench argument {other}"),
        }
    }
    let dataset = dataset.context("bench needs a dataset file")?;
    let data = load_dataset(&dataset)?;
    if data.is_empty() {
        bail!("dataset {dataset} holds no points");
    }
    info!("loaded {} points from {dataset}", data.len());

    let mut csv = String::from("n,guttman_insert,hilbert_insert,guttman_search,hilbert_search\n");
    println!("n\tg_ins\th_ins\tg_srch\th_srch");

    let mut steps: Vec<usize> = vec![5_000, 10_000, 15_000, 20_000, 25_000, 30_000, 35_000]
        .into_iter()
        .filter(|&n| n < data.len())
        .collect();
    steps.push(data.len());

    for n in steps {
        let subset = &data[..n];
        let (min_x, min_y, max_x, max_y) = bounds(subset);

        let (g_insert, g_search) = {
            let mut tree = GuttmanRTree::new(4, 8)?;
            let started = Instant::now();
            for p in subset {
                tree.insert(
                    Rect::point(vec![p.x as f64, p.y as f64])?,
                    p.id,
                )?;
            }
            let g_insert = started.elapsed().as_secs_f64();

            let window = Rect::new(
                vec![min_x as f64, min_y as f64],
                vec![max_x as f64, max_y as f64],
            )?;
            let started = Instant::now();
            let found = tree.search(&window).len();
            let g_search = started.elapsed().as_secs_f64();
            if found != n {
                bail!("guttman search found {found} of {n} points");
            }
            (g_insert, g_search)
        };

        let (h_insert, h_search) = {
            let mut tree = HilbertRTree::new(4, 8, 2, HILBERT_BITS)?;
            let started = Instant::now();
            for p in subset {
                tree.insert(Rect::point(vec![p.x, p.y])?, p.id)
                    .with_context(|| format!("point ({}, {}) off the curve lattice", p.x, p.y))?;
            }
            let h_insert = started.elapsed().as_secs_f64();

            let window = Rect::new(vec![min_x, min_y], vec![max_x, max_y])?;
            let started = Instant::now();
            let found = tree.search(&window).len();
            let h_search = started.elapsed().as_secs_f64();
            if found != n {
                bail!("hilbert search found {found} of {n} points");
            }
            (h_insert, h_search)
        };

        println!("{n}\t{g_insert:.3}\t{h_insert:.3}\t{g_search:.5}\t{h_search:.5}");
        csv.push_str(&format!(
            "{n},{g_insert:.6},{h_insert:.6},{g_search:.6},{h_search:.6}\n"
        ));
    }

    if let Some(path) = csv_path {
        fs::write(&path, csv).with_context(|| format!("writing {path}"))?;
        info!("results saved to {path}");
    }
    Ok(())
}

/// Reads whitespace-separated `lat lon` pairs, scaling by 100 onto the
/// integer lattice shared with the Hilbert tree.
fn load_dataset(path: &str) -> Result<Vec<DataPoint>> {
    let text = fs::read_to_string(path).with_context(|| format!("opening {path}"))?;
    let mut values = text.split_whitespace();
    let mut data = Vec::new();
    let mut id = 0u64;
    while let Some(lat) = values.next() {
        let lon = values.next().context("dataset has an odd number of values")?;
        let lat: f64 = lat.parse().with_context(|| format!("bad latitude {lat}"))?;
        let lon: f64 = lon.parse().with_context(|| format!("bad longitude {lon}"))?;
        data.push(DataPoint {
            x: (lat * LATTICE_SCALE) as i64,
            y: (lon * LATTICE_SCALE) as i64,
            id,
        });
        id += 1;
    }
    Ok(data)
}

fn bounds(data: &[DataPoint]) -> (i64, i64, i64, i64) {
    let mut min_x = i64::MAX;
    let mut min_y = i64::MAX;
    let mut max_x = i64::MIN;
    let mut max_y = i64::MIN;
    for p in data {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    (min_x, min_y, max_x, max_y)
}
