use std::{collections::HashMap, fs::{self, File}, io::{BufReader, Cursor, Read, Seek, SeekFrom}, path::{Path, PathBuf}};
use alicearc::image::{dcf, qnt, Raster};
use alicearc::{Archive, OpenHint};
use clap::Parser;
use image::ExtendedColorType;

#[derive(Debug, Parser)]
#[command(name = "alicearc-extract", version, about = "Extract files from AliceSoft ALD/AFA archives, converting QNT/DCF images to PNG")]
struct Cli {
	/// Archive file (.ald or .afa).
	archive: PathBuf,

	/// Entry names to extract; everything when empty.
	names: Vec<String>,

	/// Show the list of files without extracting.
	#[arg(short = 'l', long)]
	list_only: bool,

	/// Only handle QNT/DCF image entries.
	#[arg(long)]
	images_only: bool,

	/// Do not convert QNT/DCF to PNG.
	#[arg(long)]
	raw_images: bool,

	/// Do not composite DCF overlays onto their base image.
	#[arg(long)]
	plain_dcf: bool,

	/// Suppress per-file output.
	#[arg(short, long)]
	quiet: bool,

	/// Overwrite existing files.
	#[arg(short, long)]
	force: bool,

	/// Output directory; defaults to the archive name without its extension.
	#[arg(long)]
	out_dir: Option<PathBuf>
}

type ToolResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
	let cli = Cli::parse();
	if let Err(e) = run(&cli) {
		eprintln!("error: {e}");
		std::process::exit(1);
	}
}

fn run(cli: &Cli) -> ToolResult {
	let hint = match cli.archive.extension().map(|e| e.to_ascii_lowercase()) {
		Some(e) if e == "ald" => OpenHint::Ald,
		Some(e) if e == "afa" => OpenHint::Afa,
		_ => OpenHint::Auto
	};
	let mut file = BufReader::new(File::open(&cli.archive)?);
	let archive = alicearc::open(&mut file, hint)?;

	if cli.list_only {
		list_entries(&mut file, &archive, cli);
		return Ok(());
	}

	let out_dir = cli.out_dir.clone().unwrap_or_else(|| {
		cli.archive.file_stem().map_or_else(|| PathBuf::from("out"), PathBuf::from)
	});
	fs::create_dir_all(&out_dir)?;

	// base-image lookup for DCF compositing, keyed by lowercased file stem
	let mut stem_map = HashMap::new();
	for (i, entry) in archive.entries.iter().enumerate() {
		stem_map.insert(lower_stem(&entry.name), i);
	}

	for i in 0..archive.len() {
		if cli.names.is_empty() || cli.names.iter().any(|n| *n == archive.entries[i].name) {
			save_entry(&mut file, &archive, i, &stem_map, &out_dir, cli)?;
		}
	}
	Ok(())
}

fn split_lower_ext(name: &str) -> (&str, String) {
	match name.rfind('.') {
		Some(i) => (&name[..i], name[i..].to_ascii_lowercase()),
		None => (name, String::new())
	}
}

fn lower_stem(name: &str) -> String {
	split_lower_ext(name).0.to_ascii_lowercase()
}

fn is_image_ext(ext: &str) -> bool {
	ext == ".qnt" || ext == ".dcf"
}

fn list_entries<R: Read + Seek>(r: &mut R, archive: &Archive, cli: &Cli) {
	for entry in archive.entries.iter() {
		let (_, ext) = split_lower_ext(&entry.name);
		if cli.images_only && !is_image_ext(&ext) {
			continue;
		}
		if ext == ".dcf" {
			// annotate overlays with the base image they composite onto
			let base = r
				.seek(SeekFrom::Start(entry.offset))
				.ok()
				.and_then(|_| dcf::read_base_name(r).ok())
				.filter(|name| !name.is_empty());
			match base {
				Some(base) => println!("{} ({})", entry.name, base),
				None => println!("{}", entry.name)
			}
		} else {
			println!("{}", entry.name);
		}
	}
}

fn save_entry<R: Read + Seek>(
	r: &mut R,
	archive: &Archive,
	index: usize,
	stem_map: &HashMap<String, usize>,
	out_dir: &Path,
	cli: &Cli
) -> ToolResult {
	let entry = &archive.entries[index];
	let (_, ext) = split_lower_ext(&entry.name);
	let is_image = is_image_ext(&ext);
	if cli.images_only && !is_image {
		return Ok(());
	}
	let out_path = out_dir.join(&entry.name);
	let data = archive.read_entry(r, index)?;

	if cli.raw_images || !is_image {
		check_overwrite(&out_path, cli)?;
		fs::write(&out_path, &data)?;
		if !cli.quiet {
			println!("{}", out_path.display());
		}
		return Ok(());
	}

	let raster = if ext == ".qnt" {
		qnt::decode(&mut Cursor::new(&data))?
	} else {
		let (overlay, base_name) = dcf::decode(&mut Cursor::new(&data))?;
		let base_index = if cli.plain_dcf || base_name.is_empty() {
			None
		} else {
			stem_map.get(&lower_stem(&base_name))
		};
		match base_index {
			Some(&i) => composite_onto_base(r, archive, i, overlay)?,
			None => overlay
		}
	};
	if raster.pixels.is_empty() {
		// zero-dimension image, nothing to write
		return Ok(());
	}

	let mut with_png = out_path.into_os_string();
	with_png.push(".png");
	let out_path = PathBuf::from(with_png);
	check_overwrite(&out_path, cli)?;
	image::save_buffer(&out_path, raster.as_rgba_bytes(), raster.width, raster.height, ExtendedColorType::Rgba8)?;
	if !cli.quiet {
		println!("{}", out_path.display());
	}
	Ok(())
}

fn composite_onto_base<R: Read + Seek>(r: &mut R, archive: &Archive, index: usize, overlay: Raster) -> Result<Raster, Box<dyn std::error::Error>> {
	let data = archive.read_entry(r, index)?;
	// the base is normally a QNT, but may itself be a DCF overlay
	let mut base = match qnt::decode(&mut Cursor::new(&data)) {
		Ok(base) => base,
		Err(_) => dcf::decode(&mut Cursor::new(&data))?.0
	};
	if base.pixels.is_empty() {
		return Ok(overlay);
	}
	base.draw_over(&overlay);
	Ok(base)
}

fn check_overwrite(path: &Path, cli: &Cli) -> ToolResult {
	if !cli.force && path.exists() {
		return Err(format!("file {} exists, pass --force to overwrite", path.display()).into());
	}
	Ok(())
}
