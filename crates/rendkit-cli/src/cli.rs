use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rendkit_core::cubemap::CrossLayout;

#[derive(Parser, Debug)]
#[command(name = "rendkit", version, about = "rendkit - PBR material and environment preprocessing")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pack a directory of face images into a cross
    StackCross {
        /// Directory holding +x.png, -x.png, ... -z.png
        #[arg(long)]
        faces: PathBuf,

        /// Square size every face is resized to
        #[arg(long, default_value_t = 256)]
        size: u32,

        #[arg(long, value_enum, default_value = "vertical")]
        layout: LayoutArg,

        #[arg(long)]
        output: PathBuf,
    },
    /// Split a cross image into six face images
    UnstackCross {
        #[arg(long)]
        input: PathBuf,

        /// Directory the faces are written to
        #[arg(long)]
        output: PathBuf,

        /// File extension of the written faces
        #[arg(long, default_value = "exr")]
        format: String,
    },
    /// Convert a cross to the other layout
    Restack {
        #[arg(long)]
        input: PathBuf,

        /// Layout of the output cross
        #[arg(long, value_enum, default_value = "horizontal")]
        layout: LayoutArg,

        #[arg(long)]
        output: PathBuf,
    },
    /// Build importance-sampling tables for an SVBRDF material
    SampleTables {
        /// Material YAML file
        #[arg(long)]
        material: PathBuf,

        /// Table image (R = cdf, G = pdf); metadata is written next to it as JSON
        #[arg(long)]
        output: PathBuf,

        /// Also write the reduced roughness map
        #[arg(long)]
        sigma_output: Option<PathBuf>,
    },
    /// Compute the Lambertian irradiance of an environment cube
    Prefilter {
        #[command(flatten)]
        source: FaceSource,

        /// Square size faces from --faces are resized to
        #[arg(long, default_value_t = 256)]
        size: u32,

        /// Layout of the output cross
        #[arg(long, value_enum, default_value = "vertical")]
        layout: LayoutArg,

        #[arg(long)]
        output: PathBuf,
    },
    /// Run a rendered frame through a post-process chain
    Postprocess {
        /// Post-process YAML file
        #[arg(long)]
        config: PathBuf,

        /// Rendered frame
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },
}

/// Environment faces given either as a cross image or a face directory.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct FaceSource {
    /// Cross image in either layout
    #[arg(long)]
    pub cross: Option<PathBuf>,

    /// Directory holding +x.png, -x.png, ... -z.png
    #[arg(long)]
    pub faces: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LayoutArg {
    Vertical,
    Horizontal,
}

impl From<LayoutArg> for CrossLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Vertical => CrossLayout::Vertical,
            LayoutArg::Horizontal => CrossLayout::Horizontal,
        }
    }
}
