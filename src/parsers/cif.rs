//! # CIF 格式解析器
//!
//! 解析 Crystallographic Information File。支持：
//! - 晶胞参数 `_cell_length_*` / `_cell_angle_*`（含不确定度括号）
//! - `_atom_site_fract_*` 原子位置循环
//! - 对称操作 `_symmetry_equiv_pos_as_xyz` / `_space_group_symop_operation_xyz`
//!   展开为完整晶胞，并去除重复位置
//! - 多个 `data_` 块（每块为一帧）
//!
//! ## CIF 片段示例
//! ```text
//! data_NaCl
//! _cell_length_a 5.69
//! _cell_angle_alpha 90
//! loop_
//! _symmetry_equiv_pos_as_xyz
//!   'x, y, z'
//!   '-x, -y, -z'
//! loop_
//! _atom_site_label
//! _atom_site_fract_x
//! _atom_site_fract_y
//! _atom_site_fract_z
//!   Na1 0.0 0.0 0.0
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{QeosError, Result};
use crate::models::{Atom, Crystal, Lattice};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 位置去重容差（分数坐标）
const DUPLICATE_TOLERANCE: f64 = 1e-4;

const SYMOP_TAGS: [&str; 3] = [
    "_symmetry_equiv_pos_as_xyz",
    "_space_group_symop_operation_xyz",
    "_space_group_symop.operation_xyz",
];

/// 解析 CIF 文件，每个 data 块返回一个结构
pub fn parse_cif_file(path: &Path) -> Result<Vec<Crystal>> {
    let content = fs::read_to_string(path).map_err(|e| QeosError::read_error(path, e))?;
    parse_cif_content(&content, &path.display().to_string())
}

/// 从字符串内容解析 CIF
pub fn parse_cif_content(content: &str, source: &str) -> Result<Vec<Crystal>> {
    let blocks = split_blocks(content);
    if blocks.is_empty() {
        return Err(parse_error(source, "No data_ block found"));
    }

    blocks
        .iter()
        .map(|block| block_to_crystal(block, source))
        .collect()
}

/// 单个 data 块
#[derive(Debug, Default)]
struct CifBlock {
    name: String,
    tags: HashMap<String, String>,
    loops: Vec<CifLoop>,
}

#[derive(Debug, Default)]
struct CifLoop {
    headers: Vec<String>,
    values: Vec<String>,
}

impl CifLoop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == tag)
    }

    fn rows(&self) -> impl Iterator<Item = &[String]> {
        let width = self.headers.len().max(1);
        self.values.chunks(width).filter(move |row| row.len() == width)
    }
}

enum LoopState {
    None,
    Headers,
    Values,
}

/// 把文本切分为 data 块，记录标签和循环
fn split_blocks(content: &str) -> Vec<CifBlock> {
    let mut blocks: Vec<CifBlock> = Vec::new();
    let mut state = LoopState::None;
    let mut pending_tag: Option<String> = None;
    let mut in_text_field = false;

    for raw in content.lines() {
        // 分号包围的多行文本字段整体跳过
        if raw.starts_with(';') {
            in_text_field = !in_text_field;
            continue;
        }
        if in_text_field {
            continue;
        }

        let tokens = tokenize(raw);
        if tokens.is_empty() {
            continue;
        }

        let first = tokens[0].as_str();
        let lower = first.to_lowercase();

        if lower.starts_with("data_") {
            blocks.push(CifBlock {
                name: first[5..].to_string(),
                ..Default::default()
            });
            state = LoopState::None;
            pending_tag = None;
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            continue;
        };

        if lower == "loop_" {
            block.loops.push(CifLoop::default());
            state = LoopState::Headers;
            continue;
        }

        if first.starts_with('_') {
            let tag = lower;
            match state {
                LoopState::Headers => {
                    if let Some(current) = block.loops.last_mut() {
                        current.headers.push(tag);
                    }
                }
                LoopState::None | LoopState::Values => {
                    state = LoopState::None;
                    if tokens.len() > 1 {
                        block.tags.insert(tag, tokens[1].clone());
                    } else {
                        pending_tag = Some(tag);
                    }
                }
            }
            continue;
        }

        match state {
            LoopState::Headers | LoopState::Values => {
                state = LoopState::Values;
                if let Some(current) = block.loops.last_mut() {
                    current.values.extend(tokens);
                }
            }
            LoopState::None => {
                if let Some(tag) = pending_tag.take() {
                    block.tags.insert(tag, tokens[0].clone());
                }
            }
        }
    }

    blocks
}

/// 按空白切分，保留引号内的空格，去掉 # 注释
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\'' || c == '"' {
            chars.next();
            let token: String = chars.by_ref().take_while(|&ch| ch != c).collect();
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }

    tokens
}

/// 解析带不确定度的数值，如 `5.6402(3)`
fn parse_number(value: &str) -> Option<f64> {
    let cleaned = value.split('(').next().unwrap_or(value);
    cleaned.trim().parse().ok()
}

fn block_to_crystal(block: &CifBlock, source: &str) -> Result<Crystal> {
    let cell_value = |tag: &str| -> Result<f64> {
        block
            .tags
            .get(tag)
            .and_then(|v| parse_number(v))
            .ok_or_else(|| parse_error(source, &format!("Missing or invalid {}", tag)))
    };

    let lattice = Lattice::from_parameters(
        cell_value("_cell_length_a")?,
        cell_value("_cell_length_b")?,
        cell_value("_cell_length_c")?,
        cell_value("_cell_angle_alpha")?,
        cell_value("_cell_angle_beta")?,
        cell_value("_cell_angle_gamma")?,
    );

    let sites = asymmetric_sites(block, source)?;
    let operations = symmetry_operations(block, source)?;

    let mut atoms: Vec<Atom> = Vec::new();
    for (element, position) in &sites {
        for op in &operations {
            let image = wrap(op.apply(position));
            let duplicate = atoms
                .iter()
                .any(|a| a.element == *element && same_site(&a.position, &image));
            if !duplicate {
                atoms.push(Atom::new(element.clone(), image));
            }
        }
    }

    let name = if block.name.is_empty() {
        "unknown".to_string()
    } else {
        block.name.clone()
    };
    let mut crystal = Crystal::new(name, lattice, atoms);
    crystal.source_format = Some("cif".to_string());
    Ok(crystal)
}

/// 读取非对称单元位点 (元素, 分数坐标)
fn asymmetric_sites(block: &CifBlock, source: &str) -> Result<Vec<(String, [f64; 3])>> {
    let site_loop = block
        .loops
        .iter()
        .find(|l| l.column("_atom_site_fract_x").is_some())
        .ok_or_else(|| parse_error(source, "Missing _atom_site_fract_x loop"))?;

    let columns = ["_atom_site_fract_x", "_atom_site_fract_y", "_atom_site_fract_z"]
        .map(|tag| site_loop.column(tag));
    let [Some(ix), Some(iy), Some(iz)] = columns else {
        return Err(parse_error(source, "Incomplete _atom_site_fract columns"));
    };

    let species_column = site_loop
        .column("_atom_site_type_symbol")
        .or_else(|| site_loop.column("_atom_site_label"))
        .ok_or_else(|| parse_error(source, "Missing _atom_site_type_symbol or _atom_site_label"))?;

    let mut sites = Vec::new();
    for row in site_loop.rows() {
        let element = element_symbol(&row[species_column])
            .ok_or_else(|| parse_error(source, &format!("Invalid species '{}'", row[species_column])))?;
        let coords = [&row[ix], &row[iy], &row[iz]].map(|v| parse_number(v));
        match coords {
            [Some(x), Some(y), Some(z)] => sites.push((element, [x, y, z])),
            _ => return Err(parse_error(source, "Invalid fractional coordinate")),
        }
    }

    if sites.is_empty() {
        return Err(parse_error(source, "No atom sites found"));
    }
    Ok(sites)
}

/// 从 `Na1`, `Na+`, `CL` 之类的标签提取元素符号
fn element_symbol(label: &str) -> Option<String> {
    let letters: String = label.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let mut chars = letters.chars();
    let first = chars.next()?.to_ascii_uppercase();
    // 元素符号最多两个字母
    let second = chars.next().map(|c| c.to_ascii_lowercase());
    Some(match second {
        Some(s) => format!("{}{}", first, s),
        None => first.to_string(),
    })
}

/// 对称操作：x' = R·x + t
#[derive(Debug, Clone, PartialEq)]
pub struct SymOp {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl SymOp {
    pub fn identity() -> Self {
        SymOp {
            rotation: crate::models::linalg::IDENTITY,
            translation: [0.0; 3],
        }
    }

    /// 解析形如 `x+1/2, -y, z` 的对称操作
    pub fn parse(expr: &str) -> Option<Self> {
        let parts: Vec<&str> = expr.split(',').collect();
        if parts.len() != 3 {
            return None;
        }

        let mut op = SymOp {
            rotation: [[0.0; 3]; 3],
            translation: [0.0; 3],
        };
        for (i, part) in parts.iter().enumerate() {
            let (row, constant) = parse_component(part)?;
            op.rotation[i] = row;
            op.translation[i] = constant;
        }
        Some(op)
    }

    pub fn apply(&self, p: &[f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0][0] * p[0] + r[0][1] * p[1] + r[0][2] * p[2] + t[0],
            r[1][0] * p[0] + r[1][1] * p[1] + r[1][2] * p[2] + t[1],
            r[2][0] * p[0] + r[2][1] * p[1] + r[2][2] * p[2] + t[2],
        ]
    }
}

fn parse_component(expr: &str) -> Option<([f64; 3], f64)> {
    let chars: Vec<char> = expr
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if chars.is_empty() {
        return None;
    }

    let mut coeffs = [0.0; 3];
    let mut constant = 0.0;
    let mut i = 0;

    while i < chars.len() {
        let mut sign = 1.0;
        while i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
            if chars[i] == '-' {
                sign = -sign;
            }
            i += 1;
        }

        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '/') {
            i += 1;
        }
        let number = if i > start {
            let text: String = chars[start..i].iter().collect();
            Some(parse_fraction(&text)?)
        } else {
            None
        };

        if i < chars.len() && chars[i] == '*' {
            i += 1;
        }

        if i < chars.len() && matches!(chars[i], 'x' | 'y' | 'z') {
            let axis = chars[i] as usize - 'x' as usize;
            coeffs[axis] += sign * number.unwrap_or(1.0);
            i += 1;
        } else if let Some(n) = number {
            constant += sign * n;
        } else {
            return None;
        }
    }

    Some((coeffs, constant))
}

fn parse_fraction(text: &str) -> Option<f64> {
    match text.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            Some(num.parse::<f64>().ok()? / den)
        }
        None => text.parse().ok(),
    }
}

fn symmetry_operations(block: &CifBlock, source: &str) -> Result<Vec<SymOp>> {
    let found = block.loops.iter().find_map(|l| {
        SYMOP_TAGS
            .iter()
            .find_map(|tag| l.column(tag))
            .map(|column| (l, column))
    });

    let Some((symop_loop, column)) = found else {
        return Ok(vec![SymOp::identity()]);
    };

    symop_loop
        .rows()
        .map(|row| {
            SymOp::parse(&row[column]).ok_or_else(|| {
                parse_error(source, &format!("Invalid symmetry operation '{}'", row[column]))
            })
        })
        .collect()
}

fn wrap(p: [f64; 3]) -> [f64; 3] {
    p.map(|x| {
        let w = x - x.floor();
        if w > 1.0 - 1e-8 {
            0.0
        } else {
            w
        }
    })
}

fn same_site(a: &[f64; 3], b: &[f64; 3]) -> bool {
    (0..3).all(|k| {
        let d = a[k] - b[k];
        (d - d.round()).abs() < DUPLICATE_TOLERANCE
    })
}

fn parse_error(source: &str, reason: &str) -> QeosError {
    QeosError::ParseError {
        format: "cif".to_string(),
        path: source.to_string(),
        reason: reason.to_string(),
    }
}
