use std::fs::File;
use std::io::{self, BufWriter};

use anyhow::{bail, Context as _};
use sitekeeper::archive::range::{copy_range, RangeResponse};
use sitekeeper::ArchiveCatalog;

use super::Context;
use crate::output::print_json;
use crate::ArchiveCommands;

pub fn run(ctx: &Context, cmd: ArchiveCommands) -> anyhow::Result<()> {
    let catalog = ArchiveCatalog::new(&ctx.config.archive_directory);

    match cmd {
        ArchiveCommands::List => print_json(&catalog.list()?),
        ArchiveCommands::Info { name } => print_json(&catalog.info(&name)?),
        ArchiveCommands::Validate { name } => {
            if catalog.validate(&name)? {
                println!("{} looks like a valid archive", name);
                Ok(())
            } else {
                bail!("{} is not a valid archive", name)
            }
        }
        ArchiveCommands::Delete { name } => {
            catalog.delete(&name)?;
            println!("Deleted {}", name);
            Ok(())
        }
        ArchiveCommands::Serve {
            name,
            range,
            output,
        } => {
            let path = catalog.path(&name)?;
            let response = RangeResponse::prepare(&path, range.as_deref())
                .with_context(|| format!("Failed to read {}", path.display()))?;

            eprintln!("HTTP {}", response.status);
            for (header, value) in response.headers() {
                eprintln!("{}: {}", header, value);
            }

            let written = match output {
                Some(target) => {
                    let file = File::create(&target)
                        .with_context(|| format!("Failed to create {}", target.display()))?;
                    copy_range(&path, &response, &mut BufWriter::new(file))?
                }
                None => copy_range(&path, &response, &mut io::stdout().lock())?,
            };
            tracing::debug!(bytes = written, "Served {}", name);
            Ok(())
        }
    }
}
