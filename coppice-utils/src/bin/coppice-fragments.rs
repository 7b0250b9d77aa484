use std::fs::File;
use std::io::{BufReader, Write};

use clap::{App, AppSettings, Arg};
use stdinout::{Input, OrExit, Output};
use tracing_subscriber::EnvFilter;

use coppice::{
    complete_bitsets, cover_bitsets, exact_counts, exact_indices, extract_fragment_bitsets,
    extract_fragment_counts, read_treebank, ExtractOptions, Fragment, FragmentKey,
    ProductionTable, TreeArena,
};

static INPUT: &str = "INPUT";
static OUTPUT: &str = "OUTPUT";
static TREES2: &str = "TREES2";
static DISC: &str = "DISC";
static EXACT: &str = "EXACT";
static INDICES: &str = "INDICES";
static COMPLEMENT: &str = "COMPLEMENT";
static TWOTERMS: &str = "TWOTERMS";
static ADJACENT: &str = "ADJACENT";
static COVER: &str = "COVER";
static COMPLETE: &str = "COMPLETE";
static OFFSET: &str = "OFFSET";
static END: &str = "END";
static DEBUG: &str = "DEBUG";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = build().get_matches();
    let disc = matches.is_present(DISC);

    let input = Input::from(matches.value_of(INPUT).map(ToOwned::to_owned));
    let reader = BufReader::new(input.buf_read().or_exit("Can't open input treebank.", 1));

    let mut table = ProductionTable::new();
    let mut trees1 = TreeArena::new();
    let sents1 =
        read_treebank(reader, disc, &mut table, &mut trees1).or_exit("Can't read treebank.", 1);

    let mut trees2 = None;
    if let Some(path) = matches.value_of(TREES2) {
        let file = File::open(path).or_exit("Can't open second treebank.", 1);
        let mut arena = TreeArena::new();
        read_treebank(BufReader::new(file), disc, &mut table, &mut arena)
            .or_exit("Can't read second treebank.", 1);
        trees2 = Some(arena);
    }
    trees1.build_prod_index(table.len());
    if let Some(arena) = trees2.as_mut() {
        arena.build_prod_index(table.len());
    }

    let output = Output::from(matches.value_of(OUTPUT).map(ToOwned::to_owned));
    let mut writer = output.write().or_exit("Can't open output writer.", 1);

    if matches.is_present(COMPLETE) {
        let complete =
            complete_bitsets(&trees1, &sents1, &table, disc).or_exit("Can't render trees.", 1);
        for (key, _) in complete {
            writeln!(writer, "{}", key).or_exit("Can't write to output.", 1);
        }
        return;
    }
    if matches.is_present(COVER) {
        let cover =
            cover_bitsets(&trees1, &sents1, &table, disc).or_exit("Can't render cover.", 1);
        for (key, _) in cover {
            writeln!(writer, "{}", key).or_exit("Can't write to output.", 1);
        }
        return;
    }

    let opts = ExtractOptions {
        discontinuous: disc,
        complement: matches.is_present(COMPLEMENT),
        two_terms: matches.is_present(TWOTERMS),
        adjacent: matches.is_present(ADJACENT),
        debug: matches.is_present(DEBUG),
        ..ExtractOptions::default()
    };
    let offset = matches
        .value_of(OFFSET)
        .map(|v| v.parse().or_exit("Can't parse offset.", 1))
        .unwrap_or(0);
    let end = matches
        .value_of(END)
        .map(|v| v.parse().or_exit("Can't parse end.", 1))
        .unwrap_or_else(|| trees1.len());

    if matches.is_present(EXACT) || matches.is_present(INDICES) {
        let fragments =
            extract_fragment_bitsets(&trees1, &sents1, trees2.as_ref(), &table, offset, end, &opts)
                .or_exit("Extraction failed.", 1);
        let mut pairs = fragments.into_iter().collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.tree.cmp(&b.0.tree));
        let (keys, frags): (Vec<FragmentKey>, Vec<Fragment>) = pairs.into_iter().unzip();
        let target = trees2.as_ref().unwrap_or(&trees1);
        if matches.is_present(INDICES) {
            for (key, index) in keys.iter().zip(exact_indices(&trees1, target, &frags)) {
                let mut occurrences = Vec::new();
                for (tree, multiplicity) in index {
                    for _ in 0..multiplicity {
                        occurrences.push(tree);
                    }
                }
                occurrences.sort();
                let line = occurrences
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(writer, "{}\t{}", key, line).or_exit("Can't write to output.", 1);
            }
        } else {
            for (key, count) in keys.iter().zip(exact_counts(&trees1, target, &frags)) {
                writeln!(writer, "{}\t{}", key, count).or_exit("Can't write to output.", 1);
            }
        }
    } else {
        let counts =
            extract_fragment_counts(&trees1, &sents1, trees2.as_ref(), &table, offset, end, &opts)
                .or_exit("Extraction failed.", 1);
        let mut pairs = counts.into_iter().collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.tree.cmp(&b.0.tree));
        for (key, count) in pairs {
            writeln!(writer, "{}\t{}", key, count).or_exit("Can't write to output.", 1);
        }
    }
}

fn build<'a, 'b>() -> App<'a, 'b> {
    App::new("coppice-fragments")
        .settings(&[
            AppSettings::DontCollapseArgsInUsage,
            AppSettings::UnifiedHelpMessage,
        ])
        .about("Extract recurring tree fragments from a treebank")
        .arg(
            Arg::with_name(INPUT)
                .help("Treebank with one bracket tree per line")
                .index(1),
        )
        .arg(Arg::with_name(OUTPUT).help("Output file").index(2))
        .arg(
            Arg::with_name(TREES2)
                .long("trees2")
                .takes_value(true)
                .help("Second treebank to pair against"),
        )
        .arg(
            Arg::with_name(DISC)
                .long("disc")
                .help("Discontinuous input: terminal indices plus tab-separated tokens"),
        )
        .arg(
            Arg::with_name(EXACT)
                .long("exact")
                .help("Report exact occurrence counts instead of approximate ones"),
        )
        .arg(
            Arg::with_name(INDICES)
                .long("indices")
                .help("Report the tree indices of exact occurrences"),
        )
        .arg(
            Arg::with_name(COMPLEMENT)
                .long("complement")
                .help("Also emit the regions not covered by any fragment"),
        )
        .arg(
            Arg::with_name(TWOTERMS)
                .long("twoterms")
                .help("Only pair trees sharing two lexical items, one a content word"),
        )
        .arg(
            Arg::with_name(ADJACENT)
                .long("adjacent")
                .help("Only pair each tree with its successor"),
        )
        .arg(
            Arg::with_name(COVER)
                .long("cover")
                .help("Emit one single-node fragment per production and exit"),
        )
        .arg(
            Arg::with_name(COMPLETE)
                .long("complete")
                .help("Emit one whole-tree fragment per tree and exit"),
        )
        .arg(
            Arg::with_name(OFFSET)
                .long("offset")
                .takes_value(true)
                .help("First tree of the shard to process"),
        )
        .arg(
            Arg::with_name(END)
                .long("end")
                .takes_value(true)
                .help("Tree index the shard stops before"),
        )
        .arg(
            Arg::with_name(DEBUG)
                .long("debug")
                .help("Verify fragment invariants while extracting"),
        )
}
