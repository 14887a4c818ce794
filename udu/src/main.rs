use anyhow::{Context, Result, bail};
use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use itertools::Itertools;
use tracing_subscriber::EnvFilter;
use uw_core::format::archive::ArkFile;
use uw_core::format::conversation::Conversation;
use uw_core::format::graphics::critter::CritterPage;
use uw_core::format::graphics::palette::{AuxPalette, Palette, parse_aux_palettes, parse_main_palettes};
use uw_core::format::graphics::sprite::SpriteFile;
use uw_core::format::graphics::texture::TextureFile;
use uw_core::format::map::{Level, ObjectKind};
use uw_core::format::properties::{ClassProperties, CommonProperties};
use uw_core::format::strings::StringPack;

#[derive(clap::Parser, Debug)]
struct Args {
    #[clap(subcommand)]
    action: UduAction,
}

#[derive(clap::Subcommand, Debug)]
enum UduAction {
    /// Work with ARK containers (LEV.ARK, CNV.ARK)
    #[clap(subcommand)]
    Ark(ArkCommand),
    /// Work with the compressed string pack (STRINGS.PAK)
    #[clap(subcommand)]
    Strings(StringsCommand),
    /// Work with level maps inside LEV.ARK
    #[clap(subcommand)]
    Map(MapCommand),
    /// Work with .GR sprite files
    #[clap(subcommand)]
    Gr(GrCommand),
    /// Work with .TR texture files
    #[clap(subcommand)]
    Tex(TexCommand),
    /// Work with critter animation pages
    #[clap(subcommand)]
    Crit(CritCommand),
    /// Work with conversation bytecode inside CNV.ARK
    #[clap(subcommand)]
    Conv(ConvCommand),
    /// Work with object property tables
    #[clap(subcommand)]
    Props(PropsCommand),
}

#[derive(clap::Subcommand, Debug)]
enum ArkCommand {
    /// List the slots of an ARK container
    List { ark_path: Utf8PathBuf },
    /// Extract one block to a file
    Extract {
        ark_path: Utf8PathBuf,
        slot: u16,
        output_path: Utf8PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum StringsCommand {
    /// Dump decoded string blocks to stdout
    Dump {
        pak_path: Utf8PathBuf,
        /// Only dump this block
        #[clap(short, long)]
        block: Option<u16>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum MapCommand {
    /// Dump level maps as a summary or as JSON
    Dump {
        ark_path: Utf8PathBuf,
        /// Only dump this level
        #[clap(short, long)]
        level: Option<u16>,
        #[clap(long)]
        json: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum GrCommand {
    /// Decode every sprite to a PNG
    Decode {
        gr_path: Utf8PathBuf,
        pals_path: Utf8PathBuf,
        auxpals_path: Utf8PathBuf,
        output_path: Utf8PathBuf,
        /// Main palette to use
        #[clap(short, long, default_value = "0")]
        palette: usize,
    },
}

#[derive(clap::Subcommand, Debug)]
enum TexCommand {
    /// Decode every texture to a PNG
    Decode {
        tr_path: Utf8PathBuf,
        pals_path: Utf8PathBuf,
        output_path: Utf8PathBuf,
        #[clap(short, long, default_value = "0")]
        palette: usize,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CritCommand {
    /// Decode every animation frame of a page to a PNG
    Decode {
        page_path: Utf8PathBuf,
        pals_path: Utf8PathBuf,
        output_path: Utf8PathBuf,
        #[clap(short, long, default_value = "0")]
        palette: usize,
        /// Page-local auxiliary palette to use
        #[clap(short, long, default_value = "0")]
        auxpal: usize,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConvCommand {
    /// Disassemble one conversation slot
    Dump { ark_path: Utf8PathBuf, slot: u16 },
    /// List the used conversation slots
    List { ark_path: Utf8PathBuf },
}

#[derive(clap::Subcommand, Debug)]
enum PropsCommand {
    /// Dump the property tables as JSON
    Dump {
        comobj_path: Utf8PathBuf,
        /// Also dump the per-class tables from OBJECTS.DAT
        #[clap(long)]
        objects: Option<Utf8PathBuf>,
    },
}

fn read_file(path: &Utf8Path) -> Result<Bytes> {
    Ok(Bytes::from(
        std::fs::read(path).with_context(|| format!("Opening {path}"))?,
    ))
}

fn ark_command(command: ArkCommand) -> Result<()> {
    match command {
        ArkCommand::List { ark_path } => {
            let ark = ArkFile::parse(read_file(&ark_path)?).context("Parsing ark container")?;
            println!("{} declared slots", ark.slot_count());
            for block in ark.blocks() {
                println!(
                    "{:4} @ {:#010x} {:6} bytes",
                    block.slot,
                    block.offset,
                    block.len()
                );
            }
            Ok(())
        }
        ArkCommand::Extract {
            ark_path,
            slot,
            output_path,
        } => {
            let ark = ArkFile::parse(read_file(&ark_path)?).context("Parsing ark container")?;
            let block = match ark.block(slot) {
                Some(block) => block,
                None => bail!("slot {} is empty", slot),
            };
            std::fs::write(&output_path, &block.data)
                .with_context(|| format!("Writing {output_path}"))?;
            Ok(())
        }
    }
}

fn strings_command(command: StringsCommand) -> Result<()> {
    match command {
        StringsCommand::Dump { pak_path, block } => {
            let pack = StringPack::parse(read_file(&pak_path)?).context("Parsing string pack")?;
            for string_block in pack.blocks() {
                if block.is_some_and(|number| number != string_block.block_number) {
                    continue;
                }
                println!("block {:#06x}:", string_block.block_number);
                for (index, string) in string_block.iter().enumerate() {
                    println!("{:4}: {}", index, string);
                }
            }
            Ok(())
        }
    }
}

fn map_command(command: MapCommand) -> Result<()> {
    match command {
        MapCommand::Dump {
            ark_path,
            level,
            json,
        } => {
            let ark = ArkFile::parse(read_file(&ark_path)?).context("Parsing level archive")?;
            for block in ark.blocks() {
                if level.is_some_and(|level| level != block.slot) {
                    continue;
                }
                let Some(level) = Level::parse(block.slot, &block.data)
                    .with_context(|| format!("Parsing level {}", block.slot))?
                else {
                    continue;
                };
                if json {
                    println!("{}", serde_json::to_string_pretty(&level)?);
                } else {
                    print_level_summary(&level);
                }
            }
            Ok(())
        }
    }
}

fn print_level_summary(level: &Level) {
    let mut by_kind = level
        .objects
        .values()
        .counts_by(|object| object.kind())
        .into_iter()
        .collect::<Vec<_>>();
    by_kind.sort_by_key(|&(_, count)| std::cmp::Reverse(count));

    let open_tiles = level
        .tiles()
        .filter(|tile| tile.kind != uw_core::format::map::TileKind::Solid)
        .count();
    let doors = level.tiles().filter(|tile| tile.has_door).count();

    println!(
        "level {}: {} open tiles, {} door tiles, {} objects",
        level.level_num,
        open_tiles,
        doors,
        level.objects.len()
    );
    for (kind, count) in by_kind {
        println!("  {:?}: {}", kind, count);
    }
    let npcs = level
        .objects
        .values()
        .filter(|object| object.kind() == ObjectKind::Npc)
        .count();
    let talking = level
        .objects
        .values()
        .filter(|object| {
            object
                .mobile
                .as_ref()
                .is_some_and(|mobile| mobile.conversation_slot != 0)
        })
        .count();
    println!("  ({} npcs, {} with conversations)", npcs, talking);
}

fn load_palette(pals_path: &Utf8Path, index: usize) -> Result<Palette> {
    let mut palettes =
        parse_main_palettes(&read_file(pals_path)?).context("Parsing main palettes")?;
    if index >= palettes.len() {
        bail!(
            "palette {} out of range, the file has {}",
            index,
            palettes.len()
        );
    }
    Ok(palettes.swap_remove(index))
}

fn gr_command(command: GrCommand) -> Result<()> {
    match command {
        GrCommand::Decode {
            gr_path,
            pals_path,
            auxpals_path,
            output_path,
            palette,
        } => {
            let sprites = SpriteFile::parse(read_file(&gr_path)?).context("Parsing sprite file")?;
            let palette = load_palette(&pals_path, palette)?;
            let aux: Vec<AuxPalette> =
                parse_aux_palettes(&read_file(&auxpals_path)?).context("Parsing aux palettes")?;
            std::fs::create_dir_all(&output_path)?;

            let mut decoded = 0;
            for sprite in sprites.iter() {
                match sprite.decode(&palette, &aux) {
                    Ok(image) => {
                        image.save(output_path.join(format!("{:04}.png", sprite.index)))?;
                        decoded += 1;
                    }
                    Err(err) => eprintln!("sprite {}: {:#}", sprite.index, err),
                }
            }
            println!("decoded {}/{} sprites", decoded, sprites.len());
            Ok(())
        }
    }
}

fn tex_command(command: TexCommand) -> Result<()> {
    match command {
        TexCommand::Decode {
            tr_path,
            pals_path,
            output_path,
            palette,
        } => {
            let textures =
                TextureFile::parse(read_file(&tr_path)?).context("Parsing texture file")?;
            let palette = load_palette(&pals_path, palette)?;
            std::fs::create_dir_all(&output_path)?;

            let mut decoded = 0;
            for index in 0..textures.len() as u16 {
                if let Some(image) = textures.decode(index, &palette) {
                    image.save(output_path.join(format!("{:04}.png", index)))?;
                    decoded += 1;
                }
            }
            println!(
                "decoded {}/{} textures ({}x{})",
                decoded,
                textures.len(),
                textures.size,
                textures.size
            );
            Ok(())
        }
    }
}

fn crit_command(command: CritCommand) -> Result<()> {
    match command {
        CritCommand::Decode {
            page_path,
            pals_path,
            output_path,
            palette,
            auxpal,
        } => {
            let page = CritterPage::parse(read_file(&page_path)?).context("Parsing critter page")?;
            let palette = load_palette(&pals_path, palette)?;
            let aux = match page.aux_palette(auxpal) {
                Some(aux) => aux,
                None => bail!(
                    "aux palette {} out of range, the page has {}",
                    auxpal,
                    page.aux_palette_count()
                ),
            };
            std::fs::create_dir_all(&output_path)?;

            let mut decoded = 0;
            for frame in page.frames() {
                match frame.decode(&palette, aux) {
                    Ok(image) => {
                        image.save(output_path.join(format!("{:04}.png", frame.index)))?;
                        decoded += 1;
                    }
                    Err(err) => eprintln!("frame {}: {:#}", frame.index, err),
                }
            }
            println!("decoded {} frames", decoded);
            Ok(())
        }
    }
}

fn conv_command(command: ConvCommand) -> Result<()> {
    match command {
        ConvCommand::List { ark_path } => {
            let ark =
                ArkFile::parse(read_file(&ark_path)?).context("Parsing conversation archive")?;
            for block in ark.blocks() {
                match Conversation::parse(block.slot, &block.data) {
                    Ok(conv) => println!(
                        "{:4}: strings {:#06x}, {} imports, {} instructions",
                        conv.slot,
                        conv.string_block,
                        conv.imports.len(),
                        conv.code.len()
                    ),
                    Err(err) => eprintln!("{:4}: {:#}", block.slot, err),
                }
            }
            Ok(())
        }
        ConvCommand::Dump { ark_path, slot } => {
            let ark =
                ArkFile::parse(read_file(&ark_path)?).context("Parsing conversation archive")?;
            let block = match ark.block(slot) {
                Some(block) => block,
                None => bail!("conversation slot {} is empty", slot),
            };
            let conv = Conversation::parse(slot, &block.data)
                .with_context(|| format!("Parsing conversation {slot}"))?;

            println!(
                "conversation {}: strings {:#06x}, {} variables",
                conv.slot, conv.string_block, conv.num_variables
            );
            println!("imports:");
            for import in &conv.imports {
                println!(
                    "  {:#06x} {:?} {:?} {}",
                    import.id_or_addr, import.import_type, import.return_type, import.name
                );
            }
            println!("code:");
            for instruction in &conv.code {
                let operand = match instruction.operand {
                    Some(operand) => match instruction.branch_target() {
                        Some(target) => format!(" {:#06x}", target),
                        None => format!(" {}", operand),
                    },
                    None => String::new(),
                };
                println!(
                    "  {:04x}: {}{}",
                    instruction.address, instruction.opcode, operand
                );
            }
            Ok(())
        }
    }
}

fn props_command(command: PropsCommand) -> Result<()> {
    match command {
        PropsCommand::Dump {
            comobj_path,
            objects,
        } => {
            let common =
                CommonProperties::parse(read_file(&comobj_path)?).context("Parsing COMOBJ")?;
            let records: Vec<_> = common.iter().collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
            if let Some(objects_path) = objects {
                let class =
                    ClassProperties::parse(read_file(&objects_path)?).context("Parsing OBJECTS")?;
                println!("{}", serde_json::to_string_pretty(&class)?);
            }
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .init();
    let args = Args::parse();
    match args.action {
        UduAction::Ark(cmd) => ark_command(cmd),
        UduAction::Strings(cmd) => strings_command(cmd),
        UduAction::Map(cmd) => map_command(cmd),
        UduAction::Gr(cmd) => gr_command(cmd),
        UduAction::Tex(cmd) => tex_command(cmd),
        UduAction::Crit(cmd) => crit_command(cmd),
        UduAction::Conv(cmd) => conv_command(cmd),
        UduAction::Props(cmd) => props_command(cmd),
    }
}
