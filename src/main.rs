use std::path::PathBuf;

use alt_timeline::RunOptions;

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = alt_timeline::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<RunOptions>, String> {
    let mut options = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("alt-timeline {}", alt_timeline::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!(
                    "alt-timeline - A boxed, foldable social timeline in the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --dump               Print the rendered timeline and exit\n  --width N            Render at N columns\n  --file PATH          Read records from a JSON file instead of the sample feed"
                );
                return Ok(None);
            }
            "--dump" => options.dump = true,
            "--width" => {
                let value = args.next().ok_or("--width needs a value")?;
                let width = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid width: {value}"))?;
                options.width = Some(width);
            }
            "--file" => {
                let value = args.next().ok_or("--file needs a path")?;
                options.feed_file = Some(PathBuf::from(value));
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Some(options))
}
