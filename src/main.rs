use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use esp_patcher::records::{self, WeaponBasicStats, NPC, WEAPON};
use esp_patcher::{
    EspDebugger, FieldValue, FormKey, GameRelease, LinkCache, ModKey, MutablePlugin, OverlayOptions,
    PluginOverlay, TranslationMask, UnsupportedRecordPolicy, WriteOptions,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "esp_patcher")]
#[command(about = "读取、解析链接并生成覆盖补丁的 ESP/ESM/ESL 工具")]
#[command(version)]
struct Cli {
    /// 游戏版本
    #[arg(long, value_enum, global = true)]
    release: Option<GameRelease>,

    /// 读取配置 JSON（OverlayOptions），命令行参数优先
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    /// 跳过 form version 不受支持的记录（默认报告为无法读取）
    #[arg(long, global = true)]
    skip_unsupported: bool,

    /// 输出更多日志（-v 为 debug，-vv 为 trace）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 列出插件中的全部武器（EditorID: FormKey）
    Weapons {
        plugin: PathBuf,
    },
    /// 按加载顺序解析 NPC 穿戴的护甲
    Links {
        /// 加载顺序，低优先级在前
        #[arg(required = true)]
        load_order: Vec<PathBuf>,
    },
    /// 生成覆盖补丁
    Patch {
        /// 加载顺序，低优先级在前
        #[arg(required = true)]
        load_order: Vec<PathBuf>,

        /// 输出插件路径
        #[arg(short, long)]
        output: PathBuf,

        /// 每把武器增加的伤害
        #[arg(long, default_value_t = 100)]
        damage_bonus: i64,

        /// 新武器的 EditorID
        #[arg(long, default_value = "PatcherBlade")]
        new_weapon: String,

        /// 新武器套用的模板武器
        #[arg(long, default_value = "02C66F:Skyrim.esm")]
        template: String,

        /// 所有 NPC 的魔法值偏移增量（0 表示不修改 NPC）
        #[arg(long, default_value_t = 0)]
        magicka_bonus: i64,

        /// 输出文件已存在时先备份
        #[arg(long)]
        backup: bool,

        /// 输出本地化插件（名称等字段保留字符串表 ID，需另行提供字符串文件）
        #[arg(long)]
        localized: bool,
    },
    /// 显示插件统计信息
    Stats {
        plugin: PathBuf,

        /// 同时解码全部记录并报告失败的记录
        #[arg(long)]
        decode: bool,
    },
    /// 输出插件结构
    Dump {
        plugin: PathBuf,

        /// 输出文件（默认输出到标准输出）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = overlay_options(&cli)?;

    match &cli.command {
        Command::Weapons { plugin } => handle_weapons(plugin, &options),
        Command::Links { load_order } => handle_links(load_order, &options),
        Command::Patch {
            load_order,
            output,
            damage_bonus,
            new_weapon,
            template,
            magicka_bonus,
            backup,
            localized,
        } => {
            let settings = PatchSettings {
                damage_bonus: *damage_bonus,
                new_weapon,
                template: template
                    .parse()
                    .with_context(|| format!("无效的模板 FormKey: {}", template))?,
                magicka_bonus: *magicka_bonus,
                localized: *localized,
            };
            let write_options = WriteOptions {
                backup_existing: *backup,
            };
            handle_patch(load_order, output, &settings, &options, &write_options)
        }
        Command::Stats { plugin, decode } => handle_stats(plugin, *decode, &options),
        Command::Dump { plugin, output } => handle_dump(plugin, output.as_deref(), &options),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 合并配置文件与命令行参数
fn overlay_options(cli: &Cli) -> Result<OverlayOptions> {
    let mut options = match &cli.options {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("无法读取配置文件 {:?}", path))?;
            OverlayOptions::from_json_str(&json)?
        }
        None => OverlayOptions::default(),
    };
    if let Some(release) = cli.release {
        options.release = release;
    }
    if cli.skip_unsupported {
        options.on_unsupported_record = UnsupportedRecordPolicy::Skip;
    }
    Ok(options)
}

fn open(path: &Path, options: &OverlayOptions) -> Result<PluginOverlay> {
    PluginOverlay::open(path, options).with_context(|| format!("无法打开插件 {:?}", path))
}

fn open_load_order(paths: &[PathBuf], options: &OverlayOptions) -> Result<Vec<PluginOverlay>> {
    paths.iter().map(|path| open(path, options)).collect()
}

/// 列出武器
fn handle_weapons(path: &Path, options: &OverlayOptions) -> Result<()> {
    let plugin = open(path, options)?;
    for weapon in plugin.records(WEAPON) {
        println!("{}: {}", weapon.editor_id().unwrap_or_default(), weapon.form_key());
    }
    Ok(())
}

/// NPC 与其穿戴护甲；没有护甲或护甲无法解析的 NPC 不输出
fn handle_links(paths: &[PathBuf], options: &OverlayOptions) -> Result<()> {
    let plugins = open_load_order(paths, options)?;
    let load_order: Vec<&PluginOverlay> = plugins.iter().collect();
    let cache = LinkCache::build(&load_order)?;

    for npc in cache.winning_overrides(NPC) {
        let fields = match npc.fields() {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!("跳过无法读取的 NPC {}: {}", npc.form_key(), e);
                continue;
            }
        };
        let Some(armor) = records::worn_armor(fields).and_then(|link| link.try_resolve(&cache)) else {
            continue;
        };
        println!(
            "{}: {}",
            npc.editor_id().unwrap_or_default(),
            armor.editor_id().unwrap_or_default()
        );
    }
    Ok(())
}

struct PatchSettings<'a> {
    damage_bonus: i64,
    new_weapon: &'a str,
    template: FormKey,
    magicka_bonus: i64,
    localized: bool,
}

fn handle_patch(
    paths: &[PathBuf],
    output: &Path,
    settings: &PatchSettings<'_>,
    options: &OverlayOptions,
    write_options: &WriteOptions,
) -> Result<()> {
    let plugins = open_load_order(paths, options)?;
    let load_order: Vec<&PluginOverlay> = plugins.iter().collect();
    let cache = LinkCache::build(&load_order)?;

    let mod_key = ModKey::from_path(output)?;
    let mut patch = MutablePlugin::new(mod_key, options.release);
    patch.set_localized(settings.localized);

    // 每把武器的覆盖版本增加伤害
    let mut boosted = 0;
    for weapon in cache.winning_overrides(WEAPON) {
        let record = patch.get_or_add_as_override(&weapon)?;
        if WeaponBasicStats::add_damage(record, settings.damage_bonus) {
            boosted += 1;
        }
    }
    tracing::info!("{} 把武器的伤害增加了 {}", boosted, settings.damage_bonus);

    // 新武器，除名称、EditorID 和基础属性外套用模板
    let template = cache
        .resolve_as(&settings.template, WEAPON)
        .map(|view| view.deep_copy())
        .transpose()?;
    let new_weapon = patch.add_new(WEAPON)?;
    new_weapon.set_editor_id(settings.new_weapon);
    if settings.localized {
        tracing::warn!("本地化插件只能写入字符串表 ID，新武器 {} 不设置名称", settings.new_weapon);
    } else {
        new_weapon
            .fields_mut()
            .set("name", FieldValue::String(settings.new_weapon.to_string()));
    }
    WeaponBasicStats {
        value: 9000,
        weight: 1.0,
        damage: 9000,
    }
    .write(new_weapon)?;
    let new_key = new_weapon.form_key().clone();

    match template {
        Some(template) => {
            let mask = TranslationMask::all()
                .with("name", false)
                .with("editor_id", false)
                .with("basic_stats", false);
            new_weapon.deep_copy_in(&template, &mask)?;
            println!("已添加新武器 {} (模板 {})", new_key, settings.template);
        }
        None => {
            patch.remove_record(&new_key);
            println!("找不到模板武器 {}，未添加新武器", settings.template);
        }
    }

    if settings.magicka_bonus != 0 {
        for npc in cache.winning_overrides(NPC) {
            let record = patch.get_or_add_as_override(&npc)?;
            let offset = records::magicka_offset(record.fields()).unwrap_or(0);
            records::set_magicka_offset(record, offset + settings.magicka_bonus)?;
        }
    }

    if patch.is_empty() {
        bail!("没有可写入的记录");
    }
    patch.write_to_path(output, write_options).with_context(|| {
        if settings.localized {
            format!("无法写入 {:?}", output)
        } else {
            format!("无法写入 {:?}（加载顺序中有本地化插件时可使用 --localized）", output)
        }
    })?;
    println!("已写入 {:?}: {} 条记录", output, patch.len());
    Ok(())
}

fn handle_stats(path: &Path, decode: bool, options: &OverlayOptions) -> Result<()> {
    let plugin = open(path, options)?;
    print!("{}", plugin.stats());

    if decode {
        let failures = plugin.decode_all();
        println!("解码失败的记录数: {}", failures.len());
        for (form_key, err) in failures {
            println!("  {}: {}", form_key, err);
        }
    }
    Ok(())
}

fn handle_dump(path: &Path, output: Option<&Path>, options: &OverlayOptions) -> Result<()> {
    let plugin = open(path, options)?;
    match output {
        Some(output) => {
            EspDebugger::dump_file_structure(&plugin, output)?;
            println!("结构已输出到 {:?}", output);
        }
        None => {
            let stdout = std::io::stdout();
            EspDebugger::dump(&plugin, &mut stdout.lock())?;
        }
    }
    Ok(())
}
