//! Standard library tests: basic, math, string, table, os

use ay_lang::{Interpreter, Value};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Vec<Value> {
    Interpreter::new().exec(source).unwrap()
}

fn run1(source: &str) -> Value {
    run(source).into_iter().next().unwrap_or(Value::Nil)
}

/// The error message a protected call of `source` (a function body) yields.
fn fails_with(body: &str) -> String {
    let source = format!("local ok, e = pcall(function() {} end) assert(not ok) return e", body);
    run1(&source).to_string_lossy()
}

fn s(text: &str) -> Value {
    Value::from(text)
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&i| Value::Int(i)).collect()
}

// ── basic ───────────────────────────────────────────────────

#[test]
fn tostring_renders_numbers_like_lua() {
    assert_eq!(
        run("return tostring(nil), tostring(true), tostring(10 / 2), tostring(-0.0), tostring(2^63), tostring(1e100), tostring(42)"),
        vec![
            s("nil"),
            s("true"),
            s("5.0"),
            s("-0.0"),
            s("9.2233720368548e+18"),
            s("1e+100"),
            s("42"),
        ]
    );
}

#[test]
fn tonumber_conversions() {
    assert_eq!(
        run("return tonumber('0x10'), tonumber('  12  '), tonumber('1e1'), tonumber('z'), tonumber(7)"),
        vec![Value::Int(16), Value::Int(12), Value::Float(10.0), Value::Nil, Value::Int(7)]
    );
    assert_eq!(
        run("return tonumber('ff', 16), tonumber('zz', 36), tonumber('8', 8), tonumber(' -101 ', 2)"),
        vec![Value::Int(255), Value::Int(1295), Value::Nil, Value::Int(-5)]
    );
    assert_eq!(
        fails_with("tonumber(10, 16)"),
        "bad argument #1 to 'tonumber' (string expected, got number)"
    );
    assert_eq!(
        fails_with("tonumber('1', 99)"),
        "bad argument #2 to 'tonumber' (base out of range)"
    );
}

#[test]
fn select_counts_and_slices() {
    assert_eq!(run("return select(2, 'a', 'b', 'c')"), vec![s("b"), s("c")]);
    assert_eq!(run("return select(-1, 'a', 'b', 'c')"), vec![s("c")]);
    assert_eq!(run("return select('#')"), ints(&[0]));
    assert_eq!(run("return select('#', nil, nil)"), ints(&[2]));
    assert_eq!(
        fails_with("select(0, 'a')"),
        "bad argument #1 to 'select' (index out of range)"
    );
}

#[test]
fn assert_passes_values_or_raises() {
    assert_eq!(run("return assert(1, 'two')"), vec![Value::Int(1), s("two")]);
    assert_eq!(fails_with("assert(false)"), "assertion failed!");
    assert_eq!(fails_with("assert(nil, 'custom')"), "custom");
    assert_eq!(
        fails_with("assert()"),
        "bad argument #1 to 'assert' (value expected)"
    );
}

#[test]
fn protected_metatables() {
    assert_eq!(
        run1("local t = setmetatable({}, {__metatable = 'locked'}) return getmetatable(t)"),
        s("locked")
    );
    assert_eq!(
        fails_with("local t = setmetatable({}, {__metatable = 'locked'}) setmetatable(t, {})"),
        "cannot change a protected metatable"
    );
    assert_eq!(run1("return getmetatable('').__index == string"), Value::Bool(true));
    assert_eq!(
        fails_with("setmetatable({}, 1)"),
        "bad argument #2 to 'setmetatable' (nil or table expected)"
    );
}

#[test]
fn raw_access_bypasses_metamethods() {
    assert_eq!(
        run("local log = {}
             local t = setmetatable({}, {
               __index = function() return 'meta' end,
               __newindex = function(_, k) log[#log + 1] = k end,
               __len = function() return 99 end,
               __eq = function() return true end,
             })
             rawset(t, 'a', 1)
             t.b = 2
             return rawget(t, 'a'), rawget(t, 'b'), t.zzz, #log, rawlen(t), #t,
                    rawequal(t, setmetatable({}, getmetatable(t)))"),
        vec![
            Value::Int(1),
            Value::Nil,
            s("meta"),
            Value::Int(1),
            Value::Int(0),
            Value::Int(99),
            Value::Bool(false),
        ]
    );
}

#[test]
fn pairs_ipairs_next() {
    assert_eq!(
        run("local t = {10, 20, nil, 40}
             local n = 0
             for i, v in ipairs(t) do n = n + 1 end
             local proxy = setmetatable({}, {__index = function(_, i) if i <= 3 then return i * 2 end end})
             local sum = 0
             for _, v in ipairs(proxy) do sum = sum + v end
             local custom = setmetatable({}, {__pairs = function() return function(_, k) if not k then return 1, 'one' end end, nil, nil end})
             local seen
             for k, v in pairs(custom) do seen = v end
             return n, sum, seen, next({}), type(next({a = 1}))"),
        vec![
            Value::Int(2),
            Value::Int(12),
            s("one"),
            Value::Nil,
            s("string"),
        ]
    );
    assert_eq!(
        fails_with("pairs(nil)"),
        "bad argument #1 to 'pairs' (table expected, got nil)"
    );
}

#[test]
fn xpcall_runs_the_handler() {
    assert_eq!(
        run("return xpcall(function() error('x', 0) end, function(m) return 'handled ' .. m end)"),
        vec![Value::Bool(false), s("handled x")]
    );
    assert_eq!(
        run("return xpcall(function(a, b) return a + b end, print, 1, 2)"),
        vec![Value::Bool(true), Value::Int(3)]
    );
}

#[test]
fn load_compiles_chunks() {
    assert_eq!(run1("return load('return 1 + 1')()"), Value::Int(2));
    assert_eq!(run1("local f = load('local a, b = ... return a * b') return f(6, 7)"), Value::Int(42));
    let results = run("return load('x =')");
    assert_eq!(results[0], Value::Nil);
    assert!(results[1].to_string_lossy().contains("<eof>"), "{:?}", results[1]);
    assert_eq!(
        run1("local parts = {'return ', '5', ' * 2'}
              local i = 0
              return load(function() i = i + 1 return parts[i] end)()"),
        Value::Int(10)
    );
    assert_eq!(run1("load('y = 3')() return y"), Value::Int(3));
}

#[test]
fn dofile_runs_a_script() {
    let path = std::env::temp_dir().join(format!("ay_dofile_{}.lua", std::process::id()));
    std::fs::write(&path, "return 'done', 2").unwrap();
    let source = format!("return dofile({:?})", path.to_string_lossy());
    let results = run(&source);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(results, vec![s("done"), Value::Int(2)]);
}

#[test]
fn warn_control_messages() {
    assert!(run("warn('@on') warn('a ', 'b') warn('@off') warn('hidden')").is_empty());
    assert_eq!(
        fails_with("warn('x', 1)"),
        "bad argument #2 to 'warn' (string expected, got number)"
    );
}

#[test]
fn globals_table_and_version() {
    assert_eq!(
        run("x = 5 return _G.x, _G._G == _G, _VERSION"),
        vec![Value::Int(5), Value::Bool(true), s("Lua 5.4")]
    );
}

// ── math ────────────────────────────────────────────────────

#[test]
fn rounding_returns_integers() {
    assert_eq!(
        run("return math.floor(3.7), math.floor(-3.5), math.ceil(3.2), math.floor(5), math.type(math.floor(2.0))"),
        vec![Value::Int(3), Value::Int(-4), Value::Int(4), Value::Int(5), s("integer")]
    );
    assert_eq!(run1("return math.floor(math.huge)"), Value::Float(f64::INFINITY));
}

#[test]
fn math_functions() {
    assert_eq!(
        run("return math.max(1, 2.5, -1), math.min(3, 1, 2), math.abs(-4), math.abs(math.mininteger) == math.mininteger,
                   math.sqrt(16), math.tointeger(3.0), math.tointeger(3.5), math.type('1'), math.ult(1, -1)"),
        vec![
            Value::Float(2.5),
            Value::Int(1),
            Value::Int(4),
            Value::Bool(true),
            Value::Float(4.0),
            Value::Int(3),
            Value::Nil,
            Value::Nil,
            Value::Bool(true),
        ]
    );
    assert_eq!(
        run("return math.fmod(7, 3), math.fmod(-7, 3), math.fmod(7, -3), math.fmod(7.5, 2)"),
        vec![Value::Int(1), Value::Int(-1), Value::Int(1), Value::Float(1.5)]
    );
    assert_eq!(fails_with("math.fmod(7, 0)"), "bad argument #2 to 'fmod' (zero)");
    assert_eq!(
        run("local i, f = math.modf(3.75) local j, g = math.modf(-2) return i, f, j, g"),
        vec![Value::Float(3.0), Value::Float(0.75), Value::Int(-2), Value::Float(0.0)]
    );
    assert_eq!(run1("return math.log(8, 2)"), Value::Float(3.0));
    assert_eq!(fails_with("math.floor('x')"), "bad argument #1 to 'floor' (number expected, got string)");
}

#[test]
fn random_numbers() {
    assert_eq!(
        run("math.randomseed(42) local a = {math.random(1, 100), math.random(1, 100)}
             math.randomseed(42) local b = {math.random(1, 100), math.random(1, 100)}
             local f = math.random()
             local ok = true
             for _ = 1, 200 do local r = math.random(3, 5) if r < 3 or r > 5 then ok = false end end
             return a[1] == b[1] and a[2] == b[2], f >= 0 and f < 1, ok, math.type(math.random(0))"),
        vec![Value::Bool(true), Value::Bool(true), Value::Bool(true), s("integer")]
    );
    assert_eq!(fails_with("math.random(5, 1)"), "bad argument #2 to 'random' (interval is empty)");
}

#[test]
fn math_constants() {
    assert_eq!(
        run("return math.pi, math.huge, math.maxinteger, math.mininteger"),
        vec![
            Value::Float(std::f64::consts::PI),
            Value::Float(f64::INFINITY),
            Value::Int(i64::MAX),
            Value::Int(i64::MIN),
        ]
    );
}

// ── string ──────────────────────────────────────────────────

#[test]
fn string_slicing() {
    assert_eq!(
        run("local h = 'hello' return h:sub(-3), h:sub(2, -2), h:sub(0), h:sub(10), h:len(), h:reverse()"),
        vec![s("llo"), s("ell"), s("hello"), s(""), Value::Int(5), s("olleh")]
    );
}

#[test]
fn bytes_and_chars() {
    assert_eq!(run("return string.byte('ABC', 1, -1)"), ints(&[65, 66, 67]));
    assert_eq!(run("return ('A'):byte()"), ints(&[65]));
    assert_eq!(run1("return string.char(72, 105)"), s("Hi"));
    assert_eq!(fails_with("string.char(256)"), "bad argument #1 to 'char' (value out of range)");
}

#[test]
fn rep_with_separator() {
    assert_eq!(
        run("return ('ab'):rep(3, ','), ('x'):rep(0), ('x'):rep(-1), ('Ab'):upper(), ('Ab'):lower()"),
        vec![s("ab,ab,ab"), s(""), s(""), s("AB"), s("ab")]
    );
}

#[test]
fn format_integers() {
    assert_eq!(
        run("return string.format('%d|%5d|%-5d|%05d|%+d|%x|%X|%#x|%o|%.3d', 3.0, 42, 42, -42, 5, 255, 255, 255, 8, 7)"),
        vec![s("3|   42|42   |-0042|+5|ff|FF|0xff|10|007")]
    );
    assert_eq!(
        fails_with("string.format('%d', 3.5)"),
        "bad argument #2 to 'format' (number has no integer representation)"
    );
    assert_eq!(fails_with("string.format('%d')"), "bad argument #2 to 'format' (no value)");
}

#[test]
fn format_floats() {
    assert_eq!(
        run("return string.format('%5.2f|%.3e|%g|%g|%g|%a|%.1f', 3.14159, 12345.678, 1e20, 0.1, 100000, 1.0, 0.05)"),
        vec![s(" 3.14|1.235e+04|1e+20|0.1|100000|0x1p+0|0.1")]
    );
    assert_eq!(
        run1("return string.format('%f|%g', math.huge, -math.huge)"),
        s("inf|-inf")
    );
}

#[test]
fn format_strings_and_quoting() {
    assert_eq!(
        run1("local t = setmetatable({}, {__tostring = function() return 'T' end})
              return string.format('%s|%-4s|%.2s|%s|%%', t, 'ab', 'xyz', 12)"),
        s("T|ab  |xy|12|%")
    );
    assert_eq!(run1("return string.format('%q', 'a\\nb\"c')"), s("\"a\\\nb\\\"c\""));
    assert_eq!(run1("return string.format('%q', 1/0)"), s("1e9999"));
    assert_eq!(run1("return string.format('%q', math.mininteger)"), s("0x8000000000000000"));
    assert!(fails_with("string.format('%y', 1)").starts_with("invalid conversion '%y'"));
}

// ── table ───────────────────────────────────────────────────

#[test]
fn insert_and_remove() {
    assert_eq!(
        run1("local t = {1, 2, 3}
              table.insert(t, 4)
              table.insert(t, 1, 0)
              local last = table.remove(t)
              local first = table.remove(t, 1)
              return table.concat(t, ',') .. '|' .. last .. '|' .. first"),
        s("1,2,3|4|0")
    );
    assert_eq!(run1("return table.remove({})"), Value::Nil);
    assert_eq!(
        fails_with("table.insert({1}, 5, 2)"),
        "bad argument #2 to 'insert' (position out of bounds)"
    );
    assert_eq!(
        fails_with("table.insert({}, 1, 2, 3)"),
        "wrong number of arguments to 'insert'"
    );
}

#[test]
fn insert_respects_length_and_newindex() {
    assert_eq!(
        run("local log = {}
             local proxy = setmetatable({}, {
               __len = function() return 2 end,
               __newindex = function(t, k, v) log[#log + 1] = k .. '=' .. v rawset(t, k, v) end,
             })
             table.insert(proxy, 'x')
             return log[1], rawget(proxy, 3), #log"),
        vec![s("3=x"), s("x"), Value::Int(1)]
    );
    assert_eq!(
        run1("local backing = {'a', 'b'}
              local view = setmetatable({}, {
                __len = function() return #backing end,
                __index = backing,
                __newindex = backing,
              })
              table.insert(view, 1, 'z')
              return table.concat(backing, ',')"),
        s("z,a,b")
    );
    assert_eq!(
        fails_with("table.insert(setmetatable({}, {__len = function() return 'x' end}), 1)"),
        "object length is not an integer"
    );
}

#[test]
fn concat_ranges() {
    assert_eq!(
        run("local t = {'a', 'b', 3, 'd'}
             return table.concat(t), table.concat(t, '-', 2, 3), table.concat({}, 'x'), table.concat(t, ',', 3, 2)"),
        vec![s("ab3d"), s("b-3"), s(""), s("")]
    );
    assert_eq!(
        fails_with("table.concat({'a', {}})"),
        "invalid value (at index 2) in table for 'concat'"
    );
}

#[test]
fn pack_and_unpack() {
    assert_eq!(
        run("local p = table.pack(1, nil, 3) return p.n, p[3], table.unpack({1, 2, 3}, 2)"),
        vec![Value::Int(3), Value::Int(3), Value::Int(2), Value::Int(3)]
    );
    assert_eq!(run("return table.unpack({1, 2}, 1, 3)"), vec![Value::Int(1), Value::Int(2), Value::Nil]);
    assert_eq!(fails_with("table.unpack({}, 1, 1e7)"), "too many results to unpack");
}

#[test]
fn sort_orders_values() {
    assert_eq!(
        run("local a = {5, 2, 8, 1, 9, 3}
             table.sort(a)
             local b = {'pear', 'apple', 'fig'}
             table.sort(b)
             local c = {1, 2, 3, 4}
             table.sort(c, function(x, y) return x > y end)
             return table.concat(a, ','), table.concat(b, ','), table.concat(c, ',')"),
        vec![s("1,2,3,5,8,9"), s("apple,fig,pear"), s("4,3,2,1")]
    );
}

#[test]
fn sort_is_stable() {
    assert_eq!(
        run1("local rows = {{k = 2, id = 'a'}, {k = 1, id = 'b'}, {k = 2, id = 'c'}, {k = 1, id = 'd'}}
              table.sort(rows, function(x, y) return x.k < y.k end)
              local ids = {}
              for i, r in ipairs(rows) do ids[i] = r.id end
              return table.concat(ids)"),
        s("bdac")
    );
}

#[test]
fn sort_errors() {
    assert!(fails_with("table.sort({1, 'x', 2})").ends_with("attempt to compare number with string"));
    assert_eq!(
        fails_with("table.sort({2, 1}, 5)"),
        "bad argument #2 to 'sort' (function expected, got number)"
    );
}

// ── os ──────────────────────────────────────────────────────

#[test]
fn date_formats() {
    assert_eq!(
        run("return os.date('!%Y-%m-%d %H:%M:%S', 0), os.date('!%c', 0), os.date('!%A %B %j %p %y', 86400 * 40 + 13 * 3600)"),
        vec![
            s("1970-01-01 00:00:00"),
            s("Thu Jan  1 00:00:00 1970"),
            s("Tuesday February 041 PM 70"),
        ]
    );
    assert_eq!(
        fails_with("os.date('%Q', 0)"),
        "bad argument #1 to 'date' (invalid conversion specifier '%Q')"
    );
}

#[test]
fn date_table() {
    assert_eq!(
        run("local t = os.date('!*t', 0) return t.year, t.month, t.day, t.hour, t.wday, t.yday, t.isdst"),
        vec![
            Value::Int(1970),
            Value::Int(1),
            Value::Int(1),
            Value::Int(0),
            Value::Int(5),
            Value::Int(1),
            Value::Bool(false),
        ]
    );
}

#[test]
fn time_from_fields() {
    assert_eq!(
        run("local t = {year = 2000, month = 1, day = 32, hour = 0}
             local stamp = os.time(t)
             return os.time({year = 2000, month = 1, day = 1, hour = 0}), stamp, t.month, t.day,
                    os.time({year = 1970, month = 1, day = 1})"),
        vec![
            Value::Int(946_684_800),
            Value::Int(946_684_800 + 31 * 86_400),
            Value::Int(2),
            Value::Int(1),
            Value::Int(12 * 3600),
        ]
    );
    assert_eq!(
        run1("local now = os.time() return os.time(os.date('*t', now)) == now"),
        Value::Bool(true)
    );
    assert_eq!(fails_with("os.time({year = 2000, month = 1})"), "field 'day' missing in date table");
    assert_eq!(
        fails_with("os.time({year = 2000, month = 1.5, day = 1})"),
        "field 'month' is not an integer"
    );
}

#[test]
fn clock_and_difftime() {
    assert_eq!(
        run("local c = os.clock() return os.difftime(10, 4), math.type(c), c >= 0"),
        vec![Value::Float(6.0), s("float"), Value::Bool(true)]
    );
}

#[test]
fn environment_and_locale() {
    std::env::set_var("AY_STDLIB_TEST_VAR", "present");
    assert_eq!(
        run("return os.getenv('AY_STDLIB_TEST_VAR'), os.getenv('AY_SURELY_UNSET_VARIABLE'),
                   os.setlocale(), os.setlocale('C', 'numeric'), os.setlocale('fr_FR')"),
        vec![s("present"), Value::Nil, s("C"), s("C"), Value::Nil]
    );
    assert_eq!(
        fails_with("os.setlocale('C', 'bogus')"),
        "bad argument #2 to 'setlocale' (invalid option 'bogus')"
    );
}

#[test]
fn files_and_processes() {
    let results = run("local name = os.tmpname()
                       local ok = os.remove(name)
                       local gone, msg, code = os.remove(name)
                       return ok, gone, type(msg), math.type(code)");
    assert_eq!(
        results,
        vec![Value::Bool(true), Value::Nil, s("string"), s("integer")]
    );
    assert_eq!(
        run("return os.execute()"),
        vec![Value::Bool(true)]
    );
    assert_eq!(
        run("return os.execute('exit 3')"),
        vec![Value::Nil, s("exit"), Value::Int(3)]
    );
    assert_eq!(
        run("return os.execute('true')"),
        vec![Value::Bool(true), s("exit"), Value::Int(0)]
    );
    let renamed = run("return os.rename('/nonexistent/ay/a', '/nonexistent/ay/b')");
    assert_eq!(renamed[0], Value::Nil);
    assert!(renamed[1].to_string_lossy().starts_with("/nonexistent/ay/a: "));
}
