/// Validation point sampler: reads a classification GeoTIFF (and optionally a
/// reference classification used for stratification), draws a validation
/// worklist and writes it as JSON.
///
/// Georeferencing comes from the GeoTIFF ModelPixelScale / ModelTiepoint tags
/// and the GeoKey directory; `--epsg` overrides the CRS when keys are missing.
use std::fs;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use eov_core::{
    CategoricalRaster, Crs, GeoTransform, SamplerConfig, SamplingPlan, StratifiedPointSampler,
};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

// ── Constants ────────────────────────────────────────────────────────────────

/// GeoKey holding the EPSG code of a projected CRS.
const PROJECTED_CS_TYPE_GEO_KEY: u32 = 3072;
/// GeoKey holding the EPSG code of a geographic CRS.
const GEOGRAPHIC_TYPE_GEO_KEY: u32 = 2048;
/// GeoKey value meaning "user-defined", i.e. no EPSG code.
const USER_DEFINED_GEO_KEY: u32 = 32767;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "point_sampler",
    about = "Draw a stratified validation worklist from a classification GeoTIFF"
)]
struct Args {
    /// Classification raster (GeoTIFF)
    #[arg(long)]
    raster: PathBuf,

    /// Reference classification used for stratification (GeoTIFF, same frame)
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Output JSON file (created or overwritten)
    #[arg(short, long, default_value = "validation_points.json")]
    output: PathBuf,

    /// Sampler configuration JSON; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed number of points (skips the Olofsson formula)
    #[arg(long)]
    n_points: Option<usize>,

    /// Expected per-class accuracies, comma separated
    #[arg(long, value_delimiter = ',')]
    accuracies: Option<Vec<f64>>,

    /// Target standard error of overall accuracy
    #[arg(long)]
    standard_error: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Band to sample (0-based)
    #[arg(long)]
    band: Option<usize>,

    /// Nodata value; defaults to the GDAL_NODATA tag when present
    #[arg(long)]
    nodata: Option<i32>,

    /// EPSG code to assume when the GeoTIFF carries no GeoKeys
    #[arg(long)]
    epsg: Option<u32>,

    /// Class name every point starts with before review
    #[arg(long, default_value = "other")]
    default_class: String,
}

impl Args {
    fn sampler_config(&self) -> Result<SamplerConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                SamplerConfig::from_json(&text)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            None => SamplerConfig::default(),
        };
        if self.n_points.is_some() {
            cfg.n_points = self.n_points;
        }
        if let Some(acc) = &self.accuracies {
            cfg.expected_accuracies = acc.clone();
        }
        if let Some(se) = self.standard_error {
            cfg.expected_standard_error = se;
        }
        if let Some(seed) = self.seed {
            cfg.random_seed = seed;
        }
        if let Some(band) = self.band {
            cfg.band = band;
        }
        Ok(cfg)
    }
}

// ── GeoTIFF decoding ─────────────────────────────────────────────────────────

/// Widen any integer (or integral float) TIFF sample buffer to i32 labels.
/// Values that do not fit become -1, which the sampler treats as nodata.
fn labels_from(img: DecodingResult) -> Option<Vec<i32>> {
    fn narrow<T: TryInto<i32>>(v: Vec<T>) -> Vec<i32> {
        v.into_iter().map(|x| x.try_into().unwrap_or(-1)).collect()
    }
    fn round_f64(v: impl Iterator<Item = f64>) -> Vec<i32> {
        v.map(|x| {
            if x.is_finite() && x >= i32::MIN as f64 && x <= i32::MAX as f64 {
                x.round() as i32
            } else {
                -1
            }
        })
        .collect()
    }

    Some(match img {
        DecodingResult::U8(v) => narrow(v),
        DecodingResult::U16(v) => narrow(v),
        DecodingResult::U32(v) => narrow(v),
        DecodingResult::U64(v) => narrow(v),
        DecodingResult::I8(v) => narrow(v),
        DecodingResult::I16(v) => narrow(v),
        DecodingResult::I32(v) => v,
        DecodingResult::I64(v) => narrow(v),
        DecodingResult::F32(v) => round_f64(v.into_iter().map(f64::from)),
        DecodingResult::F64(v) => round_f64(v.into_iter()),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

/// Chunky (pixel-interleaved) samples → band-sequential layout.
fn deinterleave(data: &[i32], pixels: usize, bands: usize) -> Vec<i32> {
    if bands == 1 {
        return data.to_vec();
    }
    let mut out = vec![0; data.len()];
    for (i, &v) in data.iter().enumerate() {
        let (pixel, band) = (i / bands, i % bands);
        out[band * pixels + pixel] = v;
    }
    out
}

/// Build a north-up transform from ModelPixelScale `[sx, sy, sz]` and the
/// first ModelTiepoint `[i, j, k, x, y, z]`.
fn transform_from_tags(scale: &[f64], tiepoint: &[f64]) -> Option<GeoTransform> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    Some(GeoTransform::north_up(x - i * sx, y + j * sy, sx, -sy))
}

/// EPSG code from a GeoKeyDirectory: header `[version, revision, minor, n]`
/// followed by `n` entries `[key, location, count, value]`. A projected CRS
/// key wins over a geographic one.
fn epsg_from_geokeys(keys: &[u32]) -> Option<u32> {
    if keys.len() < 4 {
        return None;
    }
    let n = keys[3] as usize;
    let mut projected = None;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(n) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        // location 0: value stored inline
        if location != 0 || value == USER_DEFINED_GEO_KEY {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }
    projected.or(geographic)
}

fn read_geotiff<R: Read + Seek>(
    reader: R,
    name: &str,
    nodata: Option<i32>,
    epsg: Option<u32>,
) -> Result<CategoricalRaster> {
    let mut decoder =
        Decoder::new(reader).with_context(|| format!("{name} is not a valid TIFF"))?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    if width == 0 || height == 0 {
        bail!("Zero-sized TIFF: {name}");
    }

    let transform = match (
        decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag),
        decoder.get_tag_f64_vec(Tag::ModelTiepointTag),
    ) {
        (Ok(scale), Ok(tie)) => transform_from_tags(&scale, &tie),
        _ => None,
    };
    let transform = transform.unwrap_or_else(|| {
        eprintln!("  [warn] {name}: no ModelPixelScale/ModelTiepoint tags, using pixel coordinates");
        GeoTransform::identity()
    });

    let crs = match epsg {
        Some(code) => Crs::Epsg(code),
        None => decoder
            .get_tag_u32_vec(Tag::GeoKeyDirectoryTag)
            .ok()
            .and_then(|keys| epsg_from_geokeys(&keys))
            .map_or(Crs::Unspecified, Crs::Epsg),
    };

    let nodata = nodata.or_else(|| {
        decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
            .map(|v| v.round() as i32)
    });

    let img = decoder
        .read_image()
        .with_context(|| format!("read_image failed for {name}"))?;
    let Some(samples) = labels_from(img) else {
        bail!("Unsupported pixel type in {name}");
    };
    let pixels = width * height;
    if samples.len() % pixels != 0 {
        bail!("{name}: {} samples do not tile {width}x{height}", samples.len());
    }
    let bands = samples.len() / pixels;
    let data = deinterleave(&samples, pixels, bands);

    let mut raster = CategoricalRaster::new(data, width, height, bands, crs, transform)?;
    raster.nodata = nodata;
    Ok(raster)
}

fn open_geotiff(path: &Path, nodata: Option<i32>, epsg: Option<u32>) -> Result<CategoricalRaster> {
    let file = fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    read_geotiff(BufReader::new(file), &path.display().to_string(), nodata, epsg)
}

/// One summary line per stratum: pixels, share and points drawn.
fn quota_table(plan: &SamplingPlan) -> Vec<String> {
    plan.allocation
        .quotas
        .iter()
        .map(|q| {
            let stat = plan.statistics.get(q.class);
            format!(
                "  class {:>3}: {:>10} px ({:>6.2} %) → {} points",
                q.class,
                stat.map_or(0, |s| s.count),
                stat.map_or(0.0, |s| s.proportion * 100.0),
                q.count
            )
        })
        .collect()
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = args.sampler_config()?;

    let raster = open_geotiff(&args.raster, args.nodata, args.epsg)?;
    eprintln!(
        "[point_sampler] {}: {}x{} px, {} band(s), {}",
        args.raster.display(),
        raster.width(),
        raster.height(),
        raster.bands(),
        raster.crs
    );
    let reference = match &args.reference {
        Some(path) => {
            let r = open_geotiff(path, args.nodata, args.epsg)?;
            eprintln!("[point_sampler] stratifying on {}", path.display());
            Some(r)
        }
        None => None,
    };

    let sampler = StratifiedPointSampler::new(cfg);
    let (mut points, plan) = sampler
        .sample_with_plan(&raster, reference.as_ref())
        .context("Sampling failed")?;
    if let Some(plan) = &plan {
        for line in quota_table(plan) {
            eprintln!("{line}");
        }
    }
    points.initialize_annotations(&args.default_class);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, serde_json::to_string_pretty(&points)?)
        .with_context(|| format!("Write failed: {}", args.output.display()))?;

    eprintln!(
        "[point_sampler] Done — {} points ({}) → {}",
        points.len(),
        points.crs,
        args.output.display()
    );
    Ok(())
}
