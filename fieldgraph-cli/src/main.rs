//! # fieldgraph
//!
//! Headless driver for one filter instance: feeds raw frames (or a synthetic
//! interlaced pattern) through the planner and graph session, and writes the
//! processed stream as raw frames.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::time::Instant;

use fieldgraph_core::frame::keys;
use fieldgraph_core::{
    FilterConfig, FilterError, Frame, GraphFilter, Image, ImageFormat, ImageRequest, ScaleAlgorithm,
    SoftwareEngine,
};

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Crop {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

#[derive(Debug)]
struct CliOptions {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    width: u32,
    height: u32,
    format: ImageFormat,
    progressive: bool,
    top_field_first: bool,
    target_width: u32,
    target_height: u32,
    target_format: ImageFormat,
    progressive_out: Option<bool>,
    top_field_first_out: Option<bool>,
    crop: Crop,
    frames: u64,
    start: i64,
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
    chain: Option<String>,
    scale: Option<ScaleAlgorithm>,
    json: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            width: 720,
            height: 576,
            format: ImageFormat::Yuv422,
            progressive: true,
            top_field_first: true,
            target_width: 0,
            target_height: 0,
            target_format: ImageFormat::None,
            progressive_out: None,
            top_field_first_out: None,
            crop: Crop::default(),
            frames: 50,
            start: 0,
            config: None,
            save_config: None,
            chain: None,
            scale: None,
            json: false,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldgraph=info,fieldgraph_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    tracing::info!("fieldgraph v{}", fieldgraph_core::VERSION);
    run(&options)
}

fn parse_args(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .map(String::as_str)
                .ok_or_else(|| anyhow::anyhow!("Missing value for {}", flag))
        };

        match flag {
            "--input" | "-i" => {
                options.input = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--output" | "-o" => {
                options.output = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--size" | "-s" => {
                (options.width, options.height) = parse_size(value()?)?;
                i += 2;
            }
            "--format" | "-f" => {
                options.format = parse_format(value()?)?;
                i += 2;
            }
            "--interlaced" => {
                options.progressive = false;
                i += 1;
            }
            "--bff" => {
                options.progressive = false;
                options.top_field_first = false;
                i += 1;
            }
            "--target" | "-t" => {
                (options.target_width, options.target_height) = parse_size(value()?)?;
                i += 2;
            }
            "--target-format" => {
                options.target_format = parse_format(value()?)?;
                i += 2;
            }
            "--progressive-out" => {
                options.progressive_out = Some(true);
                i += 1;
            }
            "--interlaced-out" => {
                options.progressive_out = Some(false);
                i += 1;
            }
            "--tff-out" => {
                options.top_field_first_out = Some(true);
                i += 1;
            }
            "--bff-out" => {
                options.top_field_first_out = Some(false);
                i += 1;
            }
            "--crop" => {
                options.crop = parse_crop(value()?)?;
                i += 2;
            }
            "--frames" | "-n" => {
                let v = value()?;
                options.frames = v
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("Invalid frame count {}: {}", v, e))?;
                i += 2;
            }
            "--start" => {
                let v = value()?;
                options.start = v
                    .parse::<i64>()
                    .map_err(|e| anyhow::anyhow!("Invalid start position {}: {}", v, e))?;
                i += 2;
            }
            "--config" | "-c" => {
                options.config = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--save-config" => {
                options.save_config = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--chain" => {
                options.chain = Some(value()?.to_string());
                i += 2;
            }
            "--scale" => {
                let v = value()?;
                options.scale = Some(
                    ScaleAlgorithm::from_flag(v).ok_or_else(|| anyhow::anyhow!("Unknown scale algorithm {}", v))?,
                );
                i += 2;
            }
            "--json" => {
                options.json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                anyhow::bail!("Unknown argument {}", other);
            }
        }
    }

    if options.format == ImageFormat::None {
        anyhow::bail!("Source format must not be none");
    }
    Ok(options)
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("Size must be WxH, got {}", value))?;
    Ok((
        w.parse::<u32>().with_context(|| format!("Invalid width in {}", value))?,
        h.parse::<u32>().with_context(|| format!("Invalid height in {}", value))?,
    ))
}

fn parse_format(value: &str) -> Result<ImageFormat> {
    ImageFormat::from_name(value).ok_or_else(|| anyhow::anyhow!("Unknown image format {}", value))
}

fn parse_crop(value: &str) -> Result<Crop> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid crop {}", value))?;
    match parts.as_slice() {
        [left, right, top, bottom] => Ok(Crop {
            left: *left,
            right: *right,
            top: *top,
            bottom: *bottom,
        }),
        _ => anyhow::bail!("Crop must be LEFT,RIGHT,TOP,BOTTOM, got {}", value),
    }
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  fieldgraph [--input <raw>] [--size WxH] [--format yuv422|yuv420p|rgb24|rgb24a]\n             \
         [--interlaced | --bff] [--target WxH] [--target-format <fmt>]\n             \
         [--progressive-out | --interlaced-out] [--tff-out | --bff-out]\n             \
         [--crop L,R,T,B] [--frames <n>] [--start <pos>] [--output <raw>]\n             \
         [--config <json>] [--save-config <json>] [--chain <filters>] [--scale <algo>] [--json]\n\n\
         Without --input a moving interlaced test pattern is generated.\n"
    );
}

// ============================================================================
// Driver
// ============================================================================

#[derive(Debug, Default)]
struct RunStats {
    submitted: u64,
    written: u64,
    pending: u64,
    drained: u64,
    bytes: u64,
    out_width: u32,
    out_height: u32,
}

fn load_config(options: &CliOptions) -> Result<FilterConfig> {
    let mut config = match &options.config {
        Some(path) => FilterConfig::load(path).with_context(|| format!("Loading config {:?}", path))?,
        None => FilterConfig::default(),
    };
    if let Some(chain) = &options.chain {
        config.filter = Some(chain.clone());
    }
    if let Some(scale) = options.scale {
        config.scale_algorithm = scale;
    }
    if let Some(path) = &options.save_config {
        config
            .save(path)
            .with_context(|| format!("Saving config {:?}", path))?;
        tracing::info!("Config written to {:?}", path);
    }
    Ok(config)
}

fn run(options: &CliOptions) -> Result<()> {
    let config = load_config(options)?;
    let mut filter = GraphFilter::new(SoftwareEngine::new(), config);

    let mut reader = match &options.input {
        Some(path) => Some(BufReader::new(
            File::open(path).with_context(|| format!("Opening input {:?}", path))?,
        )),
        None => None,
    };
    let mut writer = match &options.output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output {:?}", path))?,
        )),
        None => None,
    };

    tracing::info!(
        "Processing {}x{} {} ({}) -> {}x{} {}",
        options.width,
        options.height,
        options.format,
        if options.progressive { "progressive" } else { "interlaced" },
        options.target_width,
        options.target_height,
        options.target_format
    );

    let started = Instant::now();
    let mut stats = RunStats::default();

    for index in 0..options.frames {
        let position = options.start + index as i64;
        let image = match reader.as_mut() {
            Some(reader) => match read_frame(reader, options)? {
                Some(image) => image,
                None => {
                    tracing::info!("End of input after {} frames", index);
                    break;
                }
            },
            None => test_pattern(options, index),
        };

        let mut frame = host_frame(image, options, position);
        let mut request = ImageRequest::new(options.target_format, options.target_width, options.target_height);
        stats.submitted += 1;

        match filter.get_image(&mut frame, &mut request) {
            Ok(image) => {
                stats.out_width = image.width;
                stats.out_height = image.height;
                write_image(writer.as_mut(), &image, &mut stats)?;
                stats.written += 1;
            }
            Err(FilterError::Pending) => {
                stats.pending += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("Frame {} failed", position)));
            }
        }
    }

    for processed in filter.drain()? {
        write_image(writer.as_mut(), &processed.image, &mut stats)?;
        stats.drained += 1;
    }

    if let Some(writer) = writer.as_mut() {
        writer.flush()?;
    }

    let elapsed = started.elapsed();
    tracing::info!(
        "Done: submitted={}, written={}, drained={}, pending={}, graphs={}, {:.1} ms",
        stats.submitted,
        stats.written,
        stats.drained,
        stats.pending,
        filter.builds(),
        elapsed.as_secs_f64() * 1000.0
    );

    if options.json {
        let summary = serde_json::json!({
            "submitted": stats.submitted,
            "written": stats.written,
            "drained": stats.drained,
            "pending": stats.pending,
            "bytes": stats.bytes,
            "graphs": filter.builds(),
            "output": { "width": stats.out_width, "height": stats.out_height },
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

/// A host frame carrying `image` plus the crop and consumer hints.
fn host_frame(image: Image, options: &CliOptions, position: i64) -> Frame {
    let mut frame = Frame::with_image(image, options.progressive, options.top_field_first, position);
    let props = frame.properties_mut();

    let crop = options.crop;
    props.set_int(keys::CROP_LEFT, crop.left as i64);
    props.set_int(keys::CROP_RIGHT, crop.right as i64);
    props.set_int(keys::CROP_TOP, crop.top as i64);
    props.set_int(keys::CROP_BOTTOM, crop.bottom as i64);

    if let Some(progressive) = options.progressive_out {
        props.set_int(keys::CONSUMER_PROGRESSIVE, progressive as i64);
    }
    if let Some(tff) = options.top_field_first_out {
        props.set_int(keys::CONSUMER_TOP_FIELD_FIRST, tff as i64);
    }
    frame
}

fn read_frame(reader: &mut impl Read, options: &CliOptions) -> Result<Option<Image>> {
    let size = options.format.image_size(options.width, options.height);
    let mut data = vec![0u8; size];
    match reader.read_exact(&mut data) {
        Ok(()) => Ok(Some(Image::new(data, options.format, options.width, options.height))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_image(writer: Option<&mut BufWriter<File>>, image: &Image, stats: &mut RunStats) -> Result<()> {
    stats.bytes += image.data.len() as u64;
    if let Some(writer) = writer {
        writer.write_all(&image.data)?;
    }
    Ok(())
}

// ============================================================================
// Test Pattern
// ============================================================================

/// A vertical bar sweeping across a gradient. For interlaced sources each
/// field is sampled at its own instant, so the bar combs when woven.
fn test_pattern(options: &CliOptions, index: u64) -> Image {
    let (w, h) = (options.width as usize, options.height as usize);
    let bar_width = (w / 16).max(2);

    let luma = |x: usize, y: usize| -> u8 {
        let field_time = if options.progressive {
            index as usize * 2
        } else {
            let second_field = (y % 2 == 0) != options.top_field_first;
            index as usize * 2 + second_field as usize
        };
        let bar_x = (field_time * 4) % w.max(1);
        if x >= bar_x && x < bar_x + bar_width {
            235
        } else {
            (16 + (x * 96 / w.max(1)) + (y * 96 / h.max(1))) as u8
        }
    };

    let mut data = Vec::with_capacity(options.format.image_size(options.width, options.height));
    match options.format {
        ImageFormat::Rgb24 => {
            for y in 0..h {
                for x in 0..w {
                    let v = luma(x, y);
                    data.extend_from_slice(&[v, v, v]);
                }
            }
        }
        ImageFormat::Rgb24a | ImageFormat::Opengl => {
            for y in 0..h {
                for x in 0..w {
                    let v = luma(x, y);
                    data.extend_from_slice(&[v, v, v, 255]);
                }
            }
        }
        ImageFormat::Yuv422 => {
            for y in 0..h {
                for x in (0..w).step_by(2) {
                    let y1 = if x + 1 < w { luma(x + 1, y) } else { luma(x, y) };
                    data.extend_from_slice(&[luma(x, y), 128, y1, 128]);
                }
            }
        }
        ImageFormat::Yuv420p => {
            for y in 0..h {
                for x in 0..w {
                    data.push(luma(x, y));
                }
            }
            let chroma = 2 * w.div_ceil(2) * h.div_ceil(2);
            data.resize(data.len() + chroma, 128);
        }
        ImageFormat::None => {}
    }

    Image::new(data, options.format, options.width, options.height)
}
