use clap::{Arg, ArgAction, Command};
use nppes_sync::mapper::NPPES_COLUMNS;
use std::io::{self, Write};

/// Synthetic NPPES-shaped CSV on stdout, for local runs against `--memory`.
fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("duplicate_every")
                .long("duplicate-every")
                .help("Repeat the previous NPI on every Nth row")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .default_value("1000000000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no_header")
                .long("no-header")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or(0);
    let duplicate_every = matches.get_one::<u64>("duplicate_every").copied();
    let start: u64 = matches.get_one::<u64>("start").copied().unwrap_or(1_000_000_000);

    // one column per distinct header; renamed aliases would collide on the same attribute
    let mut columns: Vec<&str> = Vec::new();
    let mut attributes: Vec<&str> = Vec::new();
    for &(column, attribute) in NPPES_COLUMNS {
        if !attributes.contains(&attribute) {
            columns.push(column);
            attributes.push(attribute);
        }
    }

    let mut out = io::BufWriter::new(io::stdout().lock());

    if !matches.get_flag("no_header") {
        let header: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        writeln!(&mut out, "{}", header.join(","))?;
    }

    let mut npi = start;
    for i in 0..rows {
        let repeat = duplicate_every.is_some_and(|n| n > 0 && i > 0 && i % n == 0);
        if !repeat {
            npi += 1;
        }
        for (c, attribute) in attributes.iter().enumerate() {
            if c > 0 {
                write!(&mut out, ",")?;
            }
            match *attribute {
                "NPI" => write!(&mut out, "\"{npi}\"")?,
                "Endpoint_Type_Description" => write!(&mut out, "\"{}\"", 1 + npi % 2)?,
                "Provider_Gender_Code" => write!(&mut out, "\"{}\"", if npi % 2 == 0 { "F" } else { "M" })?,
                "Last_Update_Date" => write!(&mut out, "\"01/{:02}/2025\"", 1 + npi % 28)?,
                "NPI_Deactivation_Date" | "NPI_Reactivation_Date" => write!(&mut out, "\"\"")?,
                a if a.contains("Telephone") || a.contains("Fax") => {
                    write!(&mut out, "\"555{:07}\"", npi % 10_000_000)?
                }
                a => write!(&mut out, "\"{}_{}\"", a.to_ascii_uppercase(), i)?,
            }
        }
        writeln!(&mut out)?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
