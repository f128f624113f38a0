use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

/// 子进程环境变量
pub type Environment = BTreeMap<String, String>;

lazy_static! {
    static ref ASSIGNMENT_RE: Regex =
        Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)=(.*)$").unwrap();
    static ref BARE_EXPORT_RE: Regex =
        Regex::new(r"^\s*export(?:\s+[A-Za-z_][A-Za-z0-9_]*)+\s*$").unwrap();
    static ref VARIABLE_RE: Regex =
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap();
    static ref QUOTED_RE: Regex = Regex::new(r#"'[^']*'|"(?:[^"\\]|\\.)*""#).unwrap();
}

/// 一行对块嵌套深度的影响：`if`/`case`/循环/函数体 +1，`fi`/`esac`/`done`/`}` -1
///
/// 引号内的内容和行尾注释不参与计数
fn block_delta(line: &str) -> i32 {
    let unquoted = QUOTED_RE.replace_all(line, "");
    let code = match unquoted.find('#') {
        Some(idx) if idx == 0 || unquoted[..idx].ends_with(char::is_whitespace) => &unquoted[..idx],
        _ => &unquoted[..],
    };

    code.split(|c: char| c.is_whitespace() || c == ';')
        .map(|word| match word {
            "if" | "case" | "for" | "while" | "until" | "{" => 1,
            "fi" | "esac" | "done" | "}" => -1,
            _ => 0,
        })
        .sum()
}

/// 展开 `$NAME` / `${NAME}`，未定义的变量展开为空串
pub fn expand(value: &str, env: &Environment) -> String {
    VARIABLE_RE
        .replace_all(value, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            env.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// 解析赋值右侧
fn parse_value(raw: &str, env: &Environment) -> String {
    let raw = raw.trim();

    if let Some(inner) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.to_string();
    }
    if raw.len() >= 2 {
        if let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return expand(inner, env);
        }
    }

    // 裸值：去掉行尾注释
    let bare = match raw.find(" #") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    expand(bare.trim_end(), env)
}

/// 把一段 profile 文本应用到 `env`，返回跳过的行数
///
/// 条件、循环、函数体整块跳过：不执行 shell，无法判断走哪个分支
pub fn apply_profile(content: &str, env: &mut Environment) -> usize {
    let mut skipped = 0;
    let mut depth = 0;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let delta = block_delta(line);
        if depth > 0 || delta != 0 {
            depth = (depth + delta).max(0);
            skipped += 1;
            continue;
        }

        if let Some(caps) = ASSIGNMENT_RE.captures(line) {
            let name = caps[1].to_string();
            let value = parse_value(&caps[2], env);
            env.insert(name, value);
        } else if BARE_EXPORT_RE.is_match(line) {
            // `export FOO BAR`：不改变值
        } else {
            skipped += 1;
        }
    }

    skipped
}

/// 按顺序加载多个 profile，后面的覆盖前面的
///
/// 文件不存在时记录 warn 并跳过；文件存在但读取失败是致命错误
pub fn load_sources<P: AsRef<Path>>(sources: &[P], env: &mut Environment) -> anyhow::Result<()> {
    for source in sources {
        let path = source.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Environment source {} not found, skipping", path.display());
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read environment source {}", path.display())
                });
            }
        };

        let skipped = apply_profile(&content, env);
        log::info!("Loaded environment from {}", path.display());
        if skipped > 0 {
            log::debug!("  {} non-assignment lines skipped in {}", skipped, path.display());
        }
    }
    Ok(())
}

/// 激活 Python 虚拟环境：等价于 `source <venv>/bin/activate`
pub fn activate_virtualenv(venv: &Path, env: &mut Environment) -> bool {
    if !venv.is_dir() {
        log::warn!("Virtualenv {} not found, using system interpreter", venv.display());
        return false;
    }

    let bin = venv.join("bin");
    let path = match env.get("PATH") {
        Some(old) if !old.is_empty() => format!("{}:{}", bin.display(), old),
        _ => bin.display().to_string(),
    };
    env.insert("PATH".to_string(), path);
    env.insert("VIRTUAL_ENV".to_string(), venv.display().to_string());
    env.remove("PYTHONHOME");

    log::info!("Activated virtualenv {}", venv.display());
    true
}

/// 当前进程的环境变量（跳过非 UTF-8 的项）
pub fn current_environment() -> Environment {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}
