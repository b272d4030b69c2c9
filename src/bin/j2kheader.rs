//! j2kheader CLI - JPEG 2000 header inspection.
//!
//! Runs the same header read the JNI bridge performs, on files from the
//! command line.

use clap::{Parser, Subcommand};
use j2k_header_rs::bridge::{CallerObject, read_header};
use j2k_header_rs::codec::native::parser::J2kMainHeader;
use j2k_header_rs::codec::{Codec, DecoderParameters, DefaultCodec, ImageHeader, NativeCodec};
use j2k_header_rs::config::BridgeConfig;
use j2k_header_rs::format::{detect_format, is_jp2_file, sniff_extension, sniff_magic};
use j2k_header_rs::input::FileInfo;
use j2k_header_rs::messages::{Messenger, TracingHandler};
use j2k_header_rs::segments::SegmentTable;
use j2k_header_rs::{HeaderError, HeaderInfo};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Read JPEG 2000 headers (JP2, J2K codestream, JPT) without decoding pixels
#[derive(Parser)]
#[command(name = "j2kheader")]
#[command(version)]
#[command(about = "Read JPEG 2000 image headers", long_about = None)]
#[command(after_help = "EXAMPLES:
    j2kheader info -i image.jp2
    j2kheader info -i scan.dcm --segment 1024:52311 --segment 54000:1200
    j2kheader dump -i image.j2k --reduce 1
    j2kheader detect -i image.jpc")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (codec messages and debug logs)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print width, height, bits per sample and samples per pixel
    #[command(visible_alias = "i")]
    Info {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// JPEG 2000 data segment inside the file, as OFFSET:LENGTH (repeatable)
        #[arg(short, long = "segment", value_parser = parse_segment)]
        segments: Vec<SegmentArg>,

        /// Load the file into memory and read the header from the buffer
        #[arg(long)]
        in_memory: bool,
    },

    /// Print the full image header and the codestream main header
    #[command(visible_alias = "d")]
    Dump {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// JPEG 2000 data segment inside the file, as OFFSET:LENGTH (repeatable)
        #[arg(short, long = "segment", value_parser = parse_segment)]
        segments: Vec<SegmentArg>,

        /// Number of highest resolution levels to discard
        #[arg(short, long, default_value = "0")]
        reduce: u32,

        /// Maximum number of quality layers, 0 for all
        #[arg(short, long, default_value = "0")]
        layers: u32,
    },

    /// Show how the container format is detected
    Detect {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, Debug)]
struct SegmentArg {
    offset: i64,
    length: i64,
}

fn parse_segment(value: &str) -> Result<SegmentArg, String> {
    let (offset, length) = value
        .split_once(':')
        .ok_or_else(|| format!("expected OFFSET:LENGTH, got '{value}'"))?;
    Ok(SegmentArg {
        offset: offset.trim().parse().map_err(|e| format!("bad offset: {e}"))?,
        length: length.trim().parse().map_err(|e| format!("bad length: {e}"))?,
    })
}

fn segment_table(segments: &[SegmentArg]) -> Result<Option<SegmentTable>, HeaderError> {
    if segments.is_empty() {
        return Ok(None);
    }
    let positions: Vec<i64> = segments.iter().map(|s| s.offset).collect();
    let lengths: Vec<i64> = segments.iter().map(|s| s.length).collect();
    SegmentTable::from_arrays(&positions, &lengths).map(Some)
}

/// Command-line stand-in for the Java decoder object.
#[derive(Default)]
struct CliCaller {
    buffer: Option<Vec<u8>>,
    segments: Vec<SegmentArg>,
}

impl CallerObject for CliCaller {
    fn compressed_stream(&mut self) -> Result<Option<Vec<u8>>, HeaderError> {
        Ok(self.buffer.take())
    }

    fn segment_positions(&mut self) -> Result<Option<Vec<i64>>, HeaderError> {
        if self.segments.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.segments.iter().map(|s| s.offset).collect()))
    }

    fn segment_lengths(&mut self) -> Result<Option<Vec<i64>>, HeaderError> {
        if self.segments.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.segments.iter().map(|s| s.length).collect()))
    }

    fn set_header_fields(&mut self, info: &HeaderInfo) -> Result<(), HeaderError> {
        println!("  Width:             {}", info.width);
        println!("  Height:            {}", info.height);
        println!("  Bits per sample:   {}", info.bits_per_sample);
        println!("  Samples per pixel: {}", info.samples_per_pixel);
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Info {
            input,
            segments,
            in_memory,
        } => show_info(&input, segments, in_memory),
        Commands::Dump {
            input,
            segments,
            reduce,
            layers,
        } => dump_header(&input, &segments, DecoderParameters { reduce, layers }),
        Commands::Detect { input } => detect(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn show_info(
    input: &Path,
    segments: Vec<SegmentArg>,
    in_memory: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut caller = CliCaller {
        segments,
        ..Default::default()
    };
    println!("File: {:?}", input);
    if in_memory {
        caller.buffer = Some(fs::read(input)?);
    }

    let args = [input.to_string_lossy().into_owned()];
    let messenger = Messenger::new(Rc::new(TracingHandler));
    read_header(
        &DefaultCodec::new(),
        &mut caller,
        &args,
        &messenger,
        &BridgeConfig::default(),
    )?;
    Ok(())
}

fn dump_header(
    input: &Path,
    segments: &[SegmentArg],
    parameters: DecoderParameters,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::default().with_decoder_parameters(parameters);
    let file = FileInfo::new(input, segment_table(segments)?, config.max_path_length)?;
    let leading = file.read_leading()?;
    let format = detect_format(Some(leading.as_slice()), Some(file.path.as_path()))?;

    let codec = NativeCodec::new();
    let messenger = Messenger::new(Rc::new(TracingHandler));
    let mut stream = match &file.segments {
        Some(table) => codec.stream_from_segments(&file.path, table)?,
        None => codec.stream_from_file(&file.path)?,
    };
    let mut decoder = codec.create_decoder(format)?;
    codec.set_message_handlers(&mut decoder, &messenger)?;
    codec.setup_decoder(&mut decoder, &config.decoder_parameters)?;
    let image = codec.read_header(&mut stream, &mut decoder)?;

    println!("File: {:?}", input);
    println!("Format: {}", format);
    print_image(&image.header);
    print_main_header(&image.main_header);
    Ok(())
}

fn print_image(header: &ImageHeader) {
    println!("Image info {{");
    println!("  x0={}, y0={}", header.x0, header.y0);
    println!("  x1={}, y1={}", header.x1, header.y1);
    println!("  numcomps={}", header.component_count());
    println!("  color_space={}", header.color_space.name());
    if let Some(icc) = &header.icc_profile {
        println!("  icc_profile={} bytes", icc.len());
    }
    for (index, comp) in header.components.iter().enumerate() {
        println!("  component {} {{", index);
        println!("    dx={}, dy={}", comp.dx, comp.dy);
        println!("    w={}, h={}", comp.w, comp.h);
        println!("    x0={}, y0={}", comp.x0, comp.y0);
        println!("    prec={}, bpp={}", comp.prec, comp.bpp);
        println!("    sgnd={}", u8::from(comp.sgnd));
        println!("  }}");
    }
    println!("}}");
}

fn print_main_header(main: &J2kMainHeader) {
    let siz = &main.siz;
    println!("Main header {{");
    println!(
        "  tiles: {}x{} at ({}, {})",
        siz.tile_width, siz.tile_height, siz.tile_x_origin, siz.tile_y_origin
    );
    if let Some(cod) = &main.cod {
        println!("  progression order: {}", cod.progression_order);
        println!(
            "  layers: {} (decoding {})",
            cod.number_of_layers, cod.layers_to_decode
        );
        println!("  decomposition levels: {}", cod.decomposition_levels);
        println!(
            "  code-block: {}x{}",
            1u32.checked_shl(u32::from(cod.codeblock_width_exp) + 2).unwrap_or(0),
            1u32.checked_shl(u32::from(cod.codeblock_height_exp) + 2).unwrap_or(0)
        );
        println!(
            "  wavelet: {}",
            if cod.transformation == 1 {
                "5-3 reversible"
            } else {
                "9-7 irreversible"
            }
        );
        println!("  mct: {}", cod.mct);
    }
    if let Some(qcd) = &main.qcd {
        println!(
            "  quantization style: {} ({} step sizes)",
            qcd.quant_style & 0x1F,
            qcd.step_sizes.len()
        );
    }
    if main.is_htj2k() {
        println!("  block coder: HTJ2K");
    }
    for comment in &main.comments {
        println!("  comment: {}", comment);
    }
    println!("}}");
}

fn detect(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut head = Vec::new();
    File::open(input)?.take(23).read_to_end(&mut head)?;

    let show = |format: Option<j2k_header_rs::CodecFormat>| {
        format.map_or_else(|| "none".to_owned(), |f| f.to_string())
    };
    println!("File: {:?}", input);
    println!("  Magic bytes: {}", show(sniff_magic(&head)));
    println!("  Extension:   {}", show(sniff_extension(input)));
    println!("  JP2 + ftyp:  {}", is_jp2_file(&head));
    println!("  Detected:    {}", detect_format(Some(head.as_slice()), Some(input))?);
    Ok(())
}
