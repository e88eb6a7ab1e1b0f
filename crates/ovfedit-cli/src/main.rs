//! ovfedit CLI - Edit hardware, profiles and bootstrap config of OVF/OVA packages.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ovfedit_core::units::{format_bytes, parse_memory_mib};
use ovfedit_core::{
    edit_hardware, inject_config, package_info, ConfigInjection, ExternalImageBuilder,
    HardwareEdit, Package, Platform, PlatformRegistry, Validator,
};

/// Profile-aware editor for OVF descriptors and OVA packages.
#[derive(Parser)]
#[command(name = "ovfedit")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Guest platform to validate against, overriding the package's product class.
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Show debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the profiles, hardware, networks and files of a package.
    Info {
        /// Path to the .ovf or .ova package.
        package: PathBuf,
    },

    /// Edit the virtual hardware of a package.
    EditHardware(EditHardwareArgs),

    /// Embed configuration files in a bootstrap disk attached to the package.
    InjectConfig(InjectConfigArgs),
}

#[derive(Args)]
struct EditHardwareArgs {
    /// Path to the .ovf or .ova package.
    package: PathBuf,

    /// Output .ovf or .ova path. Defaults to editing the package in place.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Profiles to edit, created if they don't exist. Defaults to all profiles.
    #[arg(short, long, num_args = 1..)]
    profiles: Option<Vec<String>>,

    /// Delete all profiles other than those given with --profiles.
    #[arg(long, requires = "profiles")]
    delete_all_other_profiles: bool,

    /// Number of CPUs.
    #[arg(short, long)]
    cpus: Option<u64>,

    /// Memory, e.g. 4096, 4096M or 4G (a bare number is taken as MiB).
    #[arg(short, long)]
    memory: Option<String>,

    /// Number of NICs.
    #[arg(short, long)]
    nics: Option<u64>,

    /// NIC hardware type, e.g. E1000 or VMXNET3.
    #[arg(long)]
    nic_type: Option<String>,

    /// NIC names in device order. The last name may use {N} to number the rest.
    #[arg(long, num_args = 1..)]
    nic_names: Vec<String>,

    /// MAC addresses in device order.
    #[arg(long, num_args = 1..)]
    mac_addresses: Vec<String>,

    /// Networks to connect NICs to, in device order.
    #[arg(long, num_args = 1..)]
    nic_networks: Vec<String>,

    /// Descriptions for the networks given with --nic-networks.
    #[arg(long, num_args = 1.., requires = "nic_networks")]
    network_descriptions: Vec<String>,

    /// Number of serial ports.
    #[arg(short, long)]
    serial_ports: Option<u64>,

    /// Serial port connectivity, e.g. telnet://:9101, in device order.
    #[arg(long, num_args = 1..)]
    serial_connectivity: Vec<String>,

    /// IDE controller subtypes, e.g. PIIX4.
    #[arg(long, num_args = 1..)]
    ide_subtypes: Vec<String>,

    /// SCSI controller subtypes, e.g. lsilogic or virtio.
    #[arg(long, num_args = 1..)]
    scsi_subtypes: Vec<String>,
}

#[derive(Args)]
struct InjectConfigArgs {
    /// Path to the .ovf or .ova package.
    package: PathBuf,

    /// Output .ovf or .ova path. Defaults to editing the package in place.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Primary configuration file.
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Secondary configuration file, for platforms that have one.
    #[arg(short, long)]
    secondary_config_file: Option<PathBuf>,

    /// Additional files or directories to copy into the bootstrap disk.
    #[arg(short, long, num_args = 1..)]
    extra_files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("OVFEDIT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let registry = PlatformRegistry::builtin();
    let platform = cli.platform.as_deref();

    match cli.command {
        Commands::Info { package } => show_info(&package, &registry, platform),
        Commands::EditHardware(args) => run_edit_hardware(args, &registry, platform),
        Commands::InjectConfig(args) => run_inject_config(args, &registry, platform),
    }
}

fn open(path: &Path) -> Result<Package> {
    Package::open(path).with_context(|| format!("failed to load {}", path.display()))
}

fn resolve_platform(
    package: &Package,
    registry: &PlatformRegistry,
    requested: Option<&str>,
) -> &'static Platform {
    match requested {
        Some(name) => registry.lookup(Some(name)),
        None => registry.lookup(package.document().product_identifier().as_deref()),
    }
}

fn save(package: &mut Package, output: Option<&Path>) -> Result<()> {
    let output = output.map_or_else(|| package.source().to_path_buf(), Path::to_path_buf);
    package
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))
}

fn run_edit_hardware(
    args: EditHardwareArgs,
    registry: &PlatformRegistry,
    platform: Option<&str>,
) -> Result<()> {
    let mut package = open(&args.package)?;
    let platform = resolve_platform(&package, registry, platform);

    let edit = HardwareEdit {
        profiles: args.profiles,
        delete_all_other_profiles: args.delete_all_other_profiles,
        cpus: args.cpus,
        memory_mib: args.memory.as_deref().map(parse_memory_mib).transpose()?,
        nics: args.nics,
        nic_type: args.nic_type,
        nic_names: args.nic_names,
        mac_addresses: args.mac_addresses,
        nic_networks: args.nic_networks,
        network_descriptions: args.network_descriptions,
        serial_ports: args.serial_ports,
        serial_connectivity: args.serial_connectivity,
        ide_subtypes: args.ide_subtypes,
        scsi_subtypes: args.scsi_subtypes,
    };

    let mut validator = Validator::new(platform);
    edit_hardware(package.document_mut(), &mut validator, &edit)?;
    save(&mut package, args.output.as_deref())
}

fn run_inject_config(
    args: InjectConfigArgs,
    registry: &PlatformRegistry,
    platform: Option<&str>,
) -> Result<()> {
    let mut package = open(&args.package)?;
    let platform = resolve_platform(&package, registry, platform);

    let request = ConfigInjection {
        config_file: args.config_file,
        secondary_config_file: args.secondary_config_file,
        extra_files: args.extra_files,
    };
    let builder = ExternalImageBuilder::from_env();
    let placement = inject_config(&mut package, platform, &builder, &request)?;
    tracing::debug!(
        "bootstrap image {} ({}) attached to item {}",
        placement.href,
        placement.file_id,
        placement.instance_id
    );
    save(&mut package, args.output.as_deref())
}

fn show_info(path: &Path, registry: &PlatformRegistry, platform: Option<&str>) -> Result<()> {
    let package = open(path)?;
    let platform = resolve_platform(&package, registry, platform);
    let info = package_info(package.document(), platform);

    println!("Package Information");
    println!("===================");
    println!();
    println!("Package:   {}", path.display());
    if let Some(name) = &info.name {
        println!("Name:      {name}");
    }
    if let Some(product) = &info.product {
        println!("Product:   {product}");
    }
    println!("Platform:  {}", info.platform);
    println!();

    if info.files.is_empty() {
        println!("Files:     None");
    } else {
        println!("Files:");
        for file in &info.files {
            let size = file.size.map_or_else(|| "unknown size".to_string(), format_bytes);
            match file.capacity {
                Some(capacity) => println!(
                    "  {} - {} (capacity {})",
                    file.href,
                    size,
                    format_bytes(capacity)
                ),
                None => println!("  {} - {}", file.href, size),
            }
        }
    }
    println!();

    if info.networks.is_empty() {
        println!("Networks:  None");
    } else {
        println!("Networks:");
        for network in &info.networks {
            println!("  {} - {}", network.name, network.description);
        }
    }
    println!();

    for profile in &info.profiles {
        match &profile.id {
            Some(id) => println!(
                "Profile {id}{}",
                if profile.default { " (default)" } else { "" }
            ),
            None => println!("Hardware"),
        }
        let label = profile.label.as_deref();
        if let Some(label) = label.filter(|l| Some(*l) != profile.id.as_deref()) {
            println!("  Label:     {label}");
        }
        if let Some(cpus) = profile.cpus {
            println!("  CPUs:      {cpus}");
        }
        if let Some(memory) = profile.memory_mib {
            println!("  Memory:    {memory} MB");
        }
        println!("  Serial:    {}", profile.serial_ports);
        println!("  NICs:      {}", profile.nics.len());
        for nic in &profile.nics {
            println!(
                "    {} ({}) -> {}",
                nic.name.as_deref().unwrap_or("unnamed"),
                nic.nic_type.as_deref().unwrap_or("default type"),
                nic.network.as_deref().unwrap_or("not connected"),
            );
        }
        if !profile.drives.is_empty() {
            println!("  Drives:");
            for drive in &profile.drives {
                println!(
                    "    {} ({}): {}",
                    drive.name.as_deref().unwrap_or("unnamed"),
                    drive.kind,
                    drive.file.as_deref().unwrap_or("empty"),
                );
            }
        }
        println!();
    }

    Ok(())
}
